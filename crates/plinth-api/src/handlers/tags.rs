//! Flat tags.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::RequireAuth;
use crate::services::page_bounds;
use crate::{ApiError, AppState, ListResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListTagsQuery {
    /// Name prefix, for autocomplete.
    pub prefix: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Tags with their post counts.
pub async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<ListTagsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let page = state
        .services
        .tags
        .list(query.prefix.as_deref(), limit, offset)
        .await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

#[derive(Debug, Deserialize)]
pub struct CreateTagBody {
    pub name: String,
    pub slug: Option<String>,
}

pub async fn create_tag(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(body): Json<CreateTagBody>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state
        .services
        .tags
        .create(&auth.user, &body.name, body.slug.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.tags.get(id).await?))
}

pub async fn get_tag_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.tags.get_by_slug(&slug).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTagBody {
    pub name: Option<String>,
    pub slug: Option<String>,
}

pub async fn update_tag(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTagBody>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state
        .services
        .tags
        .update(&auth.user, id, body.name.as_deref(), body.slug.as_deref())
        .await?;
    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.tags.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
