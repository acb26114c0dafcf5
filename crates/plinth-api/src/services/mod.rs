//! Application services.
//!
//! Each service validates input, loads the entity, applies the change through
//! a repository and then fires its side effects (email, search indexing,
//! queued jobs). Authorisation decisions live here rather than in handlers so
//! every entry point enforces them the same way.

pub mod addresses;
pub mod comments;
pub mod jobs;
pub mod media;
pub mod menus;
pub mod notifications;
pub mod organizations;
pub mod posts;
pub mod tags;
pub mod taxonomies;
pub mod users;

use std::fmt::Display;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use plinth_core::validation::{clamp_limit, clamp_offset};
use plinth_core::{Error, JobRepository, JobType, Result, User};
use plinth_db::Database;
use plinth_search::HybridSearchEngine;

use crate::config::AppConfig;
use crate::email::EmailService;

pub use addresses::AddressService;
pub use comments::CommentService;
pub use jobs::JobAdminService;
pub use media::MediaService;
pub use menus::MenuService;
pub use notifications::NotificationService;
pub use organizations::OrganizationService;
pub use posts::PostService;
pub use tags::TagService;
pub use taxonomies::TaxonomyService;
pub use users::UserService;

/// Every service, built once at startup and shared through the app state.
pub struct Services {
    pub users: UserService,
    pub organizations: OrganizationService,
    pub taxonomies: TaxonomyService,
    pub posts: PostService,
    pub comments: CommentService,
    pub tags: TagService,
    pub menus: MenuService,
    pub media: MediaService,
    pub notifications: NotificationService,
    pub addresses: AddressService,
    pub jobs: JobAdminService,
}

impl Services {
    pub fn new(
        db: Database,
        search: HybridSearchEngine,
        email: EmailService,
        config: &AppConfig,
    ) -> Self {
        let notifications = NotificationService::new(db.clone());
        Self {
            users: UserService::new(db.clone(), email.clone(), config.session_ttl_hours),
            organizations: OrganizationService::new(db.clone()),
            taxonomies: TaxonomyService::new(db.clone()),
            posts: PostService::new(db.clone(), search),
            comments: CommentService::new(db.clone(), notifications.clone(), email),
            tags: TagService::new(db.clone()),
            menus: MenuService::new(db.clone()),
            media: MediaService::new(db.clone(), config.max_upload_size_bytes),
            notifications,
            addresses: AddressService::new(db.clone()),
            jobs: JobAdminService::new(db),
        }
    }
}

/// Unwrap a lookup, turning a miss into `NotFound`.
pub(crate) fn require<T>(value: Option<T>, kind: &str, id: impl Display) -> Result<T> {
    value.ok_or_else(|| Error::NotFound(format!("{} {} not found", kind, id)))
}

pub(crate) fn forbidden(msg: impl Into<String>) -> Error {
    Error::Forbidden(msg.into())
}

/// Editors and admins manage everyone's content.
pub(crate) fn ensure_moderator(actor: &User) -> Result<()> {
    if actor.role.can_moderate() {
        Ok(())
    } else {
        Err(forbidden("editor or admin role required"))
    }
}

/// The owner of a resource, or a moderator.
pub(crate) fn ensure_owner_or_moderator(actor: &User, owner_id: uuid::Uuid) -> Result<()> {
    if actor.id == owner_id || actor.role.can_moderate() {
        Ok(())
    } else {
        Err(forbidden("not allowed to modify this resource"))
    }
}

/// Clamp caller-supplied paging into the allowed range.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (clamp_limit(limit), clamp_offset(offset))
}

/// Queue a side-effect job, skipping duplicates of a pending one. Failures
/// are logged: the primary write already happened.
pub(crate) async fn enqueue(db: &Database, job_type: JobType, payload: JsonValue) {
    match db
        .jobs
        .queue_deduplicated(job_type, payload, job_type.default_priority())
        .await
    {
        Ok(Some(id)) => debug!(job_id = %id, job_type = %job_type, "Job queued"),
        Ok(None) => debug!(job_type = %job_type, "Identical job already pending"),
        Err(e) => warn!(job_type = %job_type, error = %e, "Failed to queue job"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plinth_core::UserRole;
    use uuid::Uuid;

    pub(crate) fn user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            email: "u@example.com".to_string(),
            display_name: "U".to_string(),
            role,
            is_active: true,
            email_verified_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn require_maps_missing_to_not_found() {
        let err = require::<u8>(None, "Post", "abc").unwrap_err();
        assert_eq!(err.to_string(), "Not found: Post abc not found");
        assert_eq!(require(Some(3), "Post", "abc").unwrap(), 3);
    }

    #[test]
    fn moderator_checks() {
        assert!(ensure_moderator(&user(UserRole::Editor)).is_ok());
        assert!(ensure_moderator(&user(UserRole::Admin)).is_ok());
        assert!(matches!(
            ensure_moderator(&user(UserRole::Author)),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn owners_may_modify_their_own() {
        let author = user(UserRole::Author);
        assert!(ensure_owner_or_moderator(&author, author.id).is_ok());
        assert!(ensure_owner_or_moderator(&author, Uuid::new_v4()).is_err());
        assert!(ensure_owner_or_moderator(&user(UserRole::Editor), author.id).is_ok());
    }

    #[test]
    fn paging_is_clamped() {
        assert_eq!(page_bounds(None, None), (50, 0));
        assert_eq!(page_bounds(Some(10_000), Some(-4)), (200, 0));
        assert_eq!(page_bounds(Some(0), Some(7)), (1, 7));
    }
}
