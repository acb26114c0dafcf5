//! User accounts.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use plinth_core::{ListUsersRequest, UserRole};

use crate::auth::RequireAuth;
use crate::services::page_bounds;
use crate::services::users::UpdateUserInput;
use crate::{ApiError, AppState, ListResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    /// Substring of email or display name
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let req = ListUsersRequest {
        role: query.role,
        is_active: query.is_active,
        search: query.q,
        limit: Some(limit),
        offset: Some(offset),
    };
    let page = state.services.users.list(&auth.user, req).await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.services.users.get(&auth.user, id).await?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.services.users.update(&auth.user, id, body).await?;
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.users.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordBody {
    pub current_password: String,
    pub new_password: String,
}

/// Other sessions of the user are signed out; the current one stays.
pub async fn change_password(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<ChangePasswordBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .users
        .change_password(
            &auth.user,
            auth.session.id,
            id,
            &body.current_password,
            &body.new_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn user_organizations(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let memberships = state.services.users.organizations(&auth.user, id).await?;
    Ok(Json(memberships))
}
