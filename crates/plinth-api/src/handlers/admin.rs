//! Administrator endpoints: job queue inspection, failed-job recovery and
//! search reindexing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use plinth_core::{JobStatus, JobType};

use crate::auth::RequireAuth;
use crate::services::page_bounds;
use crate::{ApiError, AppState, ListResponse, PageQuery};

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let page = state
        .services
        .jobs
        .list(query.status, query.job_type, limit, offset)
        .await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn queue_stats(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    Ok(Json(state.services.jobs.stats().await?))
}

pub async fn get_job(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    Ok(Json(state.services.jobs.get(id).await?))
}

// =============================================================================
// FAILED JOBS
// =============================================================================

pub async fn list_failed_jobs(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    let (limit, offset) = query.bounds();
    let page = state.services.jobs.list_failed(limit, offset).await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn retry_failed_job(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    let job_id = state.services.jobs.retry_failed(id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

pub async fn retry_all_failed_jobs(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    let count = state.services.jobs.retry_all_failed().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "requeued": count }))))
}

pub async fn forget_failed_job(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    state.services.jobs.forget_failed(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn flush_failed_jobs(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    let deleted = state.services.jobs.flush_failed().await?;
    Ok(Json(json!({ "deleted": deleted })))
}

// =============================================================================
// SEARCH
// =============================================================================

/// Queue a full reindex. `job_id` is null when one is already pending.
pub async fn reindex_search(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_admin()?;
    if !state.search.engine_configured() {
        return Err(ApiError::BadRequest(
            "no search engine is configured".to_string(),
        ));
    }
    let job_id = state.services.jobs.queue_reindex().await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "queued": job_id.is_some() })),
    ))
}
