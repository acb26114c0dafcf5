//! plinth-api - HTTP API server for the plinth content backend.
//!
//! The binary in `main.rs` wires configuration, storage, search, email and
//! the job worker together; this library holds everything a request touches
//! so the router can be built in tests.

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod handlers;
pub mod services;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use uuid::Uuid;

use plinth_core::defaults::CORS_MAX_AGE_SECS;
use plinth_core::Page;
use plinth_db::Database;
use plinth_search::HybridSearchEngine;

use crate::config::AppConfig;
use crate::handlers::{
    addresses, admin, auth as auth_routes, comments, health, media, menus, notifications,
    organizations, posts, tags, taxonomies, users,
};
use crate::services::Services;

pub use error::ApiError;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub services: Arc<Services>,
    pub search: HybridSearchEngine,
    pub config: Arc<AppConfig>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

/// Build the global limiter from configuration. A zero quota disables it.
pub fn build_rate_limiter(config: &AppConfig) -> Option<Arc<GlobalRateLimiter>> {
    if !config.rate_limit_enabled {
        return None;
    }
    let burst = NonZeroU32::new(u32::try_from(config.rate_limit_requests).unwrap_or(u32::MAX));
    // Refill evenly so that `requests` cells come back over one period.
    let replenish = Duration::from_secs(config.rate_limit_period_secs)
        .checked_div(burst.map_or(1, NonZeroU32::get))
        .unwrap_or_default();
    let quota = Quota::with_period(replenish);
    match (quota, burst) {
        (Some(quota), Some(burst)) => Some(Arc::new(RateLimiter::direct(quota.allow_burst(burst)))),
        _ => {
            warn!(
                requests = config.rate_limit_requests,
                period_secs = config.rate_limit_period_secs,
                "Rate limit quota is zero; rate limiting disabled"
            );
            None
        }
    }
}

// =============================================================================
// STANDARD RESPONSE TYPES
// =============================================================================

/// Pagination metadata for list responses.
#[derive(Serialize, Deserialize, Debug)]
pub struct PaginationMeta {
    /// Total number of items matching the query (across all pages)
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    /// True if more items are available after this page
    pub has_more: bool,
}

/// List response wrapper with pagination metadata.
///
/// ```json
/// { "data": [...], "pagination": { "total": 100, "limit": 50, "offset": 0, "has_more": true } }
/// ```
#[derive(Serialize, Deserialize, Debug)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> ListResponse<T> {
    pub fn new(data: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        let has_more = offset + (data.len() as i64) < total;
        Self {
            data,
            pagination: PaginationMeta {
                total,
                limit,
                offset,
                has_more,
            },
        }
    }

    pub fn from_page(page: Page<T>, limit: i64, offset: i64) -> Self {
        Self::new(page.items, page.total, limit, offset)
    }
}

/// `?limit=&offset=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Clamped `(limit, offset)`.
    pub fn bounds(&self) -> (i64, i64) {
        services::page_bounds(self.limit, self.offset)
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!("Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

/// Parse configured origins, skipping (and logging) any that are not valid
/// header values.
pub fn parse_allowed_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parse_allowed_origins(&config.allowed_origins)))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

// =============================================================================
// ROUTER
// =============================================================================

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        // Authentication
        .route("/auth/register", post(auth_routes::register))
        .route("/auth/login", post(auth_routes::login))
        .route("/auth/logout", post(auth_routes::logout))
        .route("/auth/me", get(auth_routes::me))
        .route("/auth/verify-email", post(auth_routes::verify_email))
        .route("/auth/password/forgot", post(auth_routes::forgot_password))
        .route("/auth/password/reset", post(auth_routes::reset_password))
        // Users
        .route("/users", get(users::list_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/:id/password", put(users::change_password))
        .route("/users/:id/organizations", get(users::user_organizations))
        // Organizations
        .route(
            "/organizations",
            get(organizations::list_organizations).post(organizations::create_organization),
        )
        .route(
            "/organizations/slug/:slug",
            get(organizations::get_organization_by_slug),
        )
        .route(
            "/organizations/:id",
            get(organizations::get_organization)
                .patch(organizations::update_organization)
                .delete(organizations::delete_organization),
        )
        .route("/organizations/:id/children", get(organizations::children))
        .route("/organizations/:id/siblings", get(organizations::siblings))
        .route("/organizations/:id/ancestors", get(organizations::ancestors))
        .route("/organizations/:id/descendants", get(organizations::descendants))
        .route("/organizations/:id/move", post(organizations::move_organization))
        .route(
            "/organizations/:id/members",
            get(organizations::list_members).post(organizations::add_member),
        )
        .route(
            "/organizations/:id/members/:user_id",
            axum::routing::delete(organizations::remove_member),
        )
        // Taxonomies and terms
        .route(
            "/taxonomies",
            get(taxonomies::list_taxonomies).post(taxonomies::create_taxonomy),
        )
        .route(
            "/taxonomies/:id",
            get(taxonomies::get_taxonomy)
                .patch(taxonomies::update_taxonomy)
                .delete(taxonomies::delete_taxonomy),
        )
        .route(
            "/taxonomies/:id/terms",
            get(taxonomies::list_terms).post(taxonomies::create_term),
        )
        .route(
            "/terms/:id",
            get(taxonomies::get_term)
                .patch(taxonomies::update_term)
                .delete(taxonomies::delete_term),
        )
        .route("/terms/:id/children", get(taxonomies::term_children))
        .route("/terms/:id/siblings", get(taxonomies::term_siblings))
        .route("/terms/:id/ancestors", get(taxonomies::term_ancestors))
        .route("/terms/:id/descendants", get(taxonomies::term_descendants))
        .route("/terms/:id/move", post(taxonomies::move_term))
        // Posts
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/search", get(posts::search_posts))
        .route("/posts/slug/:slug", get(posts::get_post_by_slug))
        .route(
            "/posts/:id",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/:id/publish", post(posts::publish_post))
        .route("/posts/:id/unpublish", post(posts::unpublish_post))
        .route("/posts/:id/archive", post(posts::archive_post))
        .route("/posts/:id/restore", post(posts::restore_post))
        .route(
            "/posts/:id/tags",
            get(posts::get_post_tags).put(posts::set_post_tags),
        )
        .route(
            "/posts/:id/terms",
            get(posts::get_post_terms).put(posts::set_post_terms),
        )
        // Comments
        .route(
            "/posts/:id/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/comments/:id",
            get(comments::get_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .route("/comments/:id/status", put(comments::set_comment_status))
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route("/tags/slug/:slug", get(tags::get_tag_by_slug))
        .route(
            "/tags/:id",
            get(tags::get_tag).patch(tags::update_tag).delete(tags::delete_tag),
        )
        // Menus
        .route("/menus", get(menus::list_menus).post(menus::create_menu))
        .route("/menus/location/:location", get(menus::get_menu_by_location))
        .route(
            "/menus/:id",
            get(menus::get_menu)
                .patch(menus::update_menu)
                .delete(menus::delete_menu),
        )
        .route("/menus/:id/tree", get(menus::menu_tree))
        .route("/menus/:id/items", post(menus::add_menu_item))
        .route(
            "/menu-items/:id",
            patch(menus::update_menu_item).delete(menus::delete_menu_item),
        )
        .route("/menu-items/:id/move", post(menus::move_menu_item))
        // Media
        .route("/media", get(media::list_media).post(media::upload_media))
        .route(
            "/media/:id",
            get(media::get_media)
                .patch(media::update_media)
                .delete(media::delete_media),
        )
        .route("/media/:id/content", get(media::download_media))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route(
            "/notifications/:id",
            axum::routing::delete(notifications::delete_notification),
        )
        // Addresses
        .route(
            "/addresses",
            get(addresses::list_addresses).post(addresses::create_address),
        )
        .route(
            "/addresses/:id",
            get(addresses::get_address)
                .patch(addresses::update_address)
                .delete(addresses::delete_address),
        )
        .route("/addresses/:id/primary", post(addresses::set_primary_address))
        // Job queue administration
        .route("/jobs", get(admin::list_jobs))
        .route("/jobs/stats", get(admin::queue_stats))
        .route(
            "/jobs/failed",
            get(admin::list_failed_jobs).delete(admin::flush_failed_jobs),
        )
        .route("/jobs/failed/retry", post(admin::retry_all_failed_jobs))
        .route("/jobs/failed/:id/retry", post(admin::retry_failed_job))
        .route(
            "/jobs/failed/:id",
            axum::routing::delete(admin::forget_failed_job),
        )
        .route("/jobs/:id", get(admin::get_job))
        .route("/search/reindex", post(admin::reindex_search))
}

/// The full application with middleware applied.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .nest("/api/v1", api_routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(&config))
        // Multipart uploads are bounded by the body limit below, not axum's 2 MB default.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_size_bytes))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_more_is_derived_from_total() {
        let page = ListResponse::new(vec![1, 2], 5, 2, 0);
        assert!(page.pagination.has_more);

        let last = ListResponse::new(vec![5], 5, 2, 4);
        assert!(!last.pagination.has_more);

        let empty: ListResponse<i32> = ListResponse::from_page(Page::empty(), 50, 0);
        assert!(!empty.pagination.has_more);
        assert_eq!(empty.pagination.total, 0);
    }

    #[test]
    fn invalid_origins_are_skipped() {
        let origins = vec![
            "https://example.com".to_string(),
            "bad\norigin".to_string(),
        ];
        let parsed = parse_allowed_origins(&origins);
        assert_eq!(parsed, vec![HeaderValue::from_static("https://example.com")]);
    }

    #[test]
    fn disabled_or_zero_quota_yields_no_limiter() {
        let mut config = AppConfig::default();
        config.rate_limit_enabled = false;
        assert!(build_rate_limiter(&config).is_none());

        config.rate_limit_enabled = true;
        config.rate_limit_requests = 0;
        assert!(build_rate_limiter(&config).is_none());

        config.rate_limit_requests = 10;
        assert!(build_rate_limiter(&config).is_some());
    }

    #[test]
    fn request_ids_are_v7() {
        let mut maker = MakeRequestUuidV7;
        let req = axum::http::Request::new(());
        let id = maker.make_request_id(&req).unwrap();
        let parsed: Uuid = id.header_value().to_str().unwrap().parse().unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }
}
