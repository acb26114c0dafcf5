//! Organization hierarchy and memberships.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use plinth_core::MemberRole;

use super::{DepthQuery, MoveBody};
use crate::auth::RequireAuth;
use crate::services::organizations::{CreateOrganizationInput, UpdateOrganizationInput};
use crate::services::page_bounds;
use crate::{ApiError, AppState, ListResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListOrganizationsQuery {
    /// Children of this organization; roots when omitted.
    pub parent_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_organizations(
    State(state): State<AppState>,
    Query(query): Query<ListOrganizationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let page = state
        .services
        .organizations
        .list(query.parent_id, limit, offset)
        .await?;
    Ok(Json(ListResponse::from_page(page, limit, offset)))
}

pub async fn create_organization(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(body): Json<CreateOrganizationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let org = state.services.organizations.create(&auth.user, body).await?;
    Ok((StatusCode::CREATED, Json(org)))
}

pub async fn get_organization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.organizations.get(id).await?))
}

pub async fn get_organization_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.organizations.get_by_slug(&slug).await?))
}

pub async fn update_organization(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateOrganizationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let org = state
        .services
        .organizations
        .update(&auth.user, id, body)
        .await?;
    Ok(Json(org))
}

/// 409 while the organization still has children.
pub async fn delete_organization(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.organizations.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn children(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.organizations.children(id).await?))
}

pub async fn siblings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.organizations.siblings(id).await?))
}

/// Nearest first.
pub async fn ancestors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.organizations.ancestors(id).await?))
}

pub async fn descendants(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DepthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .services
        .organizations
        .descendants(id, query.max_depth)
        .await?;
    Ok(Json(entries))
}

pub async fn move_organization(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveBody>,
) -> Result<impl IntoResponse, ApiError> {
    let org = state
        .services
        .organizations
        .move_to(&auth.user, id, body.parent_id)
        .await?;
    Ok(Json(org))
}

pub async fn list_members(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state
        .services
        .organizations
        .list_members(&auth.user, id)
        .await?;
    Ok(Json(members))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberBody {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: MemberRole,
}

/// Adds the user, or changes the role of an existing member.
pub async fn add_member(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<AddMemberBody>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state
        .services
        .organizations
        .add_member(&auth.user, id, body.user_id, body.role)
        .await?;
    Ok(Json(members))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .organizations
        .remove_member(&auth.user, id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
