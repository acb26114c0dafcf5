//! Bearer session authentication.
//!
//! Session and account tokens are random alphanumeric strings handed to the
//! client exactly once. Only their SHA-256 hex digest is stored, so a leaked
//! database does not leak usable tokens. Passwords are hashed with Argon2id
//! in PHC string format.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use plinth_core::defaults::SESSION_TOKEN_LENGTH;
use plinth_core::{Error, Result, Session, User};

use crate::{ApiError, AppState};

/// Generate a fresh random token.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// The form in which tokens are stored and looked up.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored PHC hash. A malformed stored hash never
/// verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// The token from an `Authorization: Bearer ...` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extractor for requests that may carry a session.
///
/// Missing, unknown and expired tokens all resolve to an anonymous caller;
/// only storage failures reject the request.
#[derive(Debug, Clone, Default)]
pub struct Auth {
    pub user: Option<User>,
    pub session: Option<Session>,
}

impl Auth {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Auth::default());
        };

        match state.services.users.authenticate(token).await {
            Ok((session, user)) => Ok(Auth {
                user: Some(user),
                session: Some(session),
            }),
            Err(Error::Unauthorized(_)) => Ok(Auth::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Extractor that requires a valid session.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    pub user: User,
    pub session: Session,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let auth = Auth::from_request_parts(parts, state).await?;

        match (auth.user, auth.session) {
            (Some(user), Some(session)) => Ok(RequireAuth { user, session }),
            _ => Err(ApiError::Unauthorized(
                "Authentication required".to_string(),
            )),
        }
    }
}

impl RequireAuth {
    /// Reject callers that are not site administrators.
    pub fn require_admin(&self) -> std::result::Result<(), ApiError> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}
