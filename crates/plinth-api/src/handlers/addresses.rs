//! Addresses of users and organizations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use plinth_core::OwnerType;

use crate::auth::RequireAuth;
use crate::services::addresses::{CreateAddressInput, UpdateAddressInput};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
}

/// Primary address first.
pub async fn list_addresses(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let addresses = state
        .services
        .addresses
        .list_for_owner(&auth.user, query.owner_type, query.owner_id)
        .await?;
    Ok(Json(addresses))
}

pub async fn create_address(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(body): Json<CreateAddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state.services.addresses.create(&auth.user, body).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn get_address(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.services.addresses.get(&auth.user, id).await?))
}

pub async fn update_address(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateAddressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state
        .services
        .addresses
        .update(&auth.user, id, body)
        .await?;
    Ok(Json(address))
}

pub async fn delete_address(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.addresses.delete(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_primary_address(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state
        .services
        .addresses
        .set_primary(&auth.user, id)
        .await?;
    Ok(Json(address))
}
