//! Taxonomies and their term trees.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{DepthQuery, MoveBody};
use crate::auth::RequireAuth;
use crate::services::page_bounds;
use crate::services::taxonomies::{CreateTaxonomyInput, CreateTermInput, RenameInput};
use crate::{ApiError, AppState, ListResponse, PageQuery};

// =============================================================================
// TAXONOMIES
// =============================================================================

pub async fn list_taxonomies(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = query.bounds();
    let page = state.services.taxonomies.list(limit, offset).await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn create_taxonomy(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(body): Json<CreateTaxonomyInput>,
) -> Result<impl IntoResponse, ApiError> {
    let taxonomy = state.services.taxonomies.create(&auth.user, body).await?;
    Ok((StatusCode::CREATED, Json(taxonomy)))
}

pub async fn get_taxonomy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.taxonomies.get(id).await?))
}

pub async fn update_taxonomy(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameInput>,
) -> Result<impl IntoResponse, ApiError> {
    let taxonomy = state
        .services
        .taxonomies
        .update(&auth.user, id, body)
        .await?;
    Ok(Json(taxonomy))
}

pub async fn delete_taxonomy(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.taxonomies.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// TERMS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListTermsQuery {
    /// Children of this term; roots when omitted.
    pub parent_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_terms(
    State(state): State<AppState>,
    Path(taxonomy_id): Path<Uuid>,
    Query(query): Query<ListTermsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let page = state
        .services
        .taxonomies
        .list_terms(taxonomy_id, query.parent_id, limit, offset)
        .await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn create_term(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(taxonomy_id): Path<Uuid>,
    Json(body): Json<CreateTermInput>,
) -> Result<impl IntoResponse, ApiError> {
    let term = state
        .services
        .taxonomies
        .create_term(&auth.user, taxonomy_id, body)
        .await?;
    Ok((StatusCode::CREATED, Json(term)))
}

pub async fn get_term(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.taxonomies.get_term(id).await?))
}

pub async fn update_term(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameInput>,
) -> Result<impl IntoResponse, ApiError> {
    let term = state
        .services
        .taxonomies
        .update_term(&auth.user, id, body)
        .await?;
    Ok(Json(term))
}

/// 409 while the term still has children.
pub async fn delete_term(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.taxonomies.delete_term(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn term_children(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.taxonomies.children(id).await?))
}

pub async fn term_siblings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.taxonomies.siblings(id).await?))
}

pub async fn term_ancestors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.taxonomies.ancestors(id).await?))
}

pub async fn term_descendants(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DepthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .services
        .taxonomies
        .descendants(id, query.max_depth)
        .await?;
    Ok(Json(entries))
}

pub async fn move_term(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveBody>,
) -> Result<impl IntoResponse, ApiError> {
    let term = state
        .services
        .taxonomies
        .move_term(&auth.user, id, body.parent_id)
        .await?;
    Ok(Json(term))
}
