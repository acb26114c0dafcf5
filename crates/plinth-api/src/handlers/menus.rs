//! Navigation menus.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::RequireAuth;
use crate::services::menus::{CreateMenuItemInput, UpdateMenuItemInput};
use crate::{ApiError, AppState};

pub async fn list_menus(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.menus.list().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateMenuBody {
    pub name: String,
    /// Theme slot such as `primary` or `footer`; unique.
    pub location: String,
}

pub async fn create_menu(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(body): Json<CreateMenuBody>,
) -> Result<impl IntoResponse, ApiError> {
    let menu = state
        .services
        .menus
        .create(&auth.user, &body.name, &body.location)
        .await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

pub async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.menus.get(id).await?))
}

/// The nested menu at a theme location.
pub async fn get_menu_by_location(
    State(state): State<AppState>,
    Path(location): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let menu = state.services.menus.get_by_location(&location).await?;
    Ok(Json(state.services.menus.tree(menu.id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMenuBody {
    pub name: Option<String>,
    pub location: Option<String>,
}

pub async fn update_menu(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMenuBody>,
) -> Result<impl IntoResponse, ApiError> {
    let menu = state
        .services
        .menus
        .update(&auth.user, id, body.name.as_deref(), body.location.as_deref())
        .await?;
    Ok(Json(menu))
}

pub async fn delete_menu(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.menus.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn menu_tree(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.menus.tree(id).await?))
}

pub async fn add_menu_item(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(menu_id): Path<Uuid>,
    Json(body): Json<CreateMenuItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .menus
        .add_item(&auth.user, menu_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_menu_item(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMenuItemInput>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .menus
        .update_item(&auth.user, id, body)
        .await?;
    Ok(Json(item))
}

/// Children of the deleted item move up one level.
pub async fn delete_menu_item(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.menus.delete_item(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MoveItemBody {
    pub parent_id: Option<Uuid>,
    pub position: Option<i32>,
}

pub async fn move_menu_item(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveItemBody>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .menus
        .move_item(&auth.user, id, body.parent_id, body.position)
        .await?;
    Ok(Json(item))
}
