//! Posts, their tags and terms, and search.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use plinth_core::defaults::PAGE_LIMIT_SEARCH;
use plinth_core::Post;
use plinth_search::SearchBackend;

use crate::auth::{Auth, RequireAuth};
use crate::services::page_bounds;
use crate::services::posts::{CreatePostInput, PostFilters, UpdatePostInput};
use crate::{ApiError, AppState, ListResponse, PaginationMeta};

pub async fn list_posts(
    State(state): State<AppState>,
    auth: Auth,
    Query(filters): Query<PostFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(filters.limit, filters.offset);
    let page = state.services.posts.list(auth.user(), filters).await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn create_post(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(body): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.services.posts.create(&auth.user, body).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.posts.get(auth.user(), id).await?))
}

pub async fn get_post_by_slug(
    State(state): State<AppState>,
    auth: Auth,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state.services.posts.get_by_slug(auth.user(), &slug).await?,
    ))
}

pub async fn update_post(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.services.posts.update(&auth.user, id, body).await?;
    Ok(Json(post))
}

/// Soft delete; the post can be restored.
pub async fn delete_post(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.posts.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_post(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.posts.publish(&auth.user, id).await?))
}

pub async fn unpublish_post(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.posts.unpublish(&auth.user, id).await?))
}

pub async fn archive_post(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.posts.archive(&auth.user, id).await?))
}

pub async fn restore_post(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.posts.restore(&auth.user, id).await?))
}

// =============================================================================
// TAGS AND TERMS
// =============================================================================

pub async fn get_post_tags(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.posts.tags(auth.user(), id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetTagsBody {
    /// Tag names; unknown tags are created.
    pub tags: Vec<String>,
}

pub async fn set_post_tags(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<SetTagsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = state
        .services
        .posts
        .set_tags(&auth.user, id, &body.tags)
        .await?;
    Ok(Json(tags))
}

pub async fn get_post_terms(
    State(state): State<AppState>,
    auth: Auth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.posts.get(auth.user(), id).await?;
    Ok(Json(state.services.taxonomies.post_terms(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetTermsBody {
    pub taxonomy_id: Uuid,
    pub term_ids: Vec<Uuid>,
}

/// Replace the post's terms within one taxonomy.
pub async fn set_post_terms(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<SetTermsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let terms = state
        .services
        .taxonomies
        .set_post_terms(&auth.user, id, body.taxonomy_id, &body.term_ids)
        .await?;
    Ok(Json(terms))
}

// =============================================================================
// SEARCH
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub data: Vec<Post>,
    pub pagination: PaginationMeta,
    /// Which backend answered: the engine or the SQL fallback.
    pub backend: SearchBackend,
}

/// Published posts only.
pub async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::BadRequest("q must not be empty".to_string()));
    }
    let (limit, offset) = page_bounds(query.limit.or(Some(PAGE_LIMIT_SEARCH)), query.offset);
    let results = state
        .services
        .posts
        .search(query.q.trim(), limit, offset)
        .await?;

    let list = ListResponse::new(results.items, results.total, limit, offset);
    Ok(Json(SearchResponse {
        data: list.data,
        pagination: list.pagination,
        backend: results.backend,
    }))
}
