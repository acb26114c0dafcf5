//! Liveness and dependency status.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Database reachability plus search engine status. Reports 503 only when the
/// database is down; a missing or unhealthy engine degrades to SQL search.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (ping, engine) = futures::join!(state.db.ping(), state.search.engine_status());
    let database = ping.is_ok();
    let search = match engine {
        None => "disabled",
        Some(true) => "available",
        Some(false) => "unavailable",
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": if database { "connected" } else { "unreachable" },
            "search": search,
        })),
    )
}
