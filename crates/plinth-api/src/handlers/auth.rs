//! Registration, sessions and account tokens.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{bearer_token, RequireAuth};
use crate::services::users::{LoginInput, RegisterInput};
use crate::{ApiError, AppState};

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.services.users.register(body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.services.users.login(body).await?;
    Ok(Json(result))
}

pub async fn logout(
    State(state): State<AppState>,
    _auth: RequireAuth,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state.services.users.logout(token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(auth: RequireAuth) -> impl IntoResponse {
    Json(auth.user)
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<TokenBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.services.users.verify_email(&body.token).await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordBody {
    pub email: String,
}

/// Always 202, whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .users
        .request_password_reset(&body.email)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "If the account exists, a reset link has been sent" })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordBody {
    pub token: String,
    pub password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .users
        .reset_password(&body.token, &body.password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
