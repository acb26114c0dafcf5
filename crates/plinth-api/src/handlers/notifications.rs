//! The caller's notification inbox.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::RequireAuth;
use crate::services::page_bounds;
use crate::{ApiError, AppState, ListResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let page = state
        .services
        .notifications
        .list(&auth.user, query.unread_only, limit, offset)
        .await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.services.notifications.unread_count(&auth.user).await?;
    Ok(Json(json!({ "unread": count })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state
        .services
        .notifications
        .mark_read(&auth.user, id)
        .await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.services.notifications.mark_all_read(&auth.user).await?;
    Ok(Json(json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.notifications.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
