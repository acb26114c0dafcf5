//! Comment threads on posts.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use plinth_core::CommentStatus;

use crate::auth::{Auth, RequireAuth};
use crate::services::comments::CreateCommentInput;
use crate::services::page_bounds;
use crate::{ApiError, AppState, ListResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListCommentsQuery {
    /// Moderators only; everyone else sees approved comments.
    pub status: Option<CommentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_comments(
    State(state): State<AppState>,
    auth: Auth,
    Path(post_id): Path<Uuid>,
    Query(query): Query<ListCommentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let page = state
        .services
        .comments
        .list_for_post(auth.user(), post_id, query.status, limit, offset)
        .await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(post_id): Path<Uuid>,
    Json(body): Json<CreateCommentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .services
        .comments
        .create(&auth.user, post_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_comment(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.comments.get(auth.user(), id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentBody {
    pub body: String,
}

pub async fn update_comment(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateCommentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .services
        .comments
        .update(&auth.user, id, &body.body)
        .await?;
    Ok(Json(comment))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: CommentStatus,
}

pub async fn set_comment_status(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .services
        .comments
        .set_status(&auth.user, id, body.status)
        .await?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.comments.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
