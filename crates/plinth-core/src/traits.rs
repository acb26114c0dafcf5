//! Repository traits for plinth.
//!
//! These traits define the storage interfaces the services depend on. The
//! PostgreSQL implementations live in `plinth-db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;

// =============================================================================
// HIERARCHY
// =============================================================================

/// Existence queries shared by every self-referential tree (organizations,
/// terms, menu items).
#[async_trait]
pub trait TreeRepository: Send + Sync {
    /// Human-readable entity name used in error messages.
    fn node_kind(&self) -> &'static str;

    /// Whether a node with this id exists.
    async fn node_exists(&self, id: Uuid) -> Result<bool>;

    /// Whether `candidate` lies anywhere below `ancestor`.
    async fn is_descendant(&self, ancestor: Uuid, candidate: Uuid) -> Result<bool>;
}

/// Reject a re-parenting that would create a cycle or point at a missing
/// node. Moving to the root (`None`) is always allowed.
pub async fn ensure_valid_move<R>(repo: &R, id: Uuid, new_parent: Option<Uuid>) -> Result<()>
where
    R: TreeRepository + ?Sized,
{
    let Some(parent) = new_parent else {
        return Ok(());
    };
    let kind = repo.node_kind();

    if parent == id {
        return Err(Error::InvalidInput(format!(
            "{} cannot be its own parent",
            kind
        )));
    }
    if !repo.node_exists(parent).await? {
        return Err(Error::NotFound(format!("parent {} {} not found", kind, parent)));
    }
    if repo.is_descendant(id, parent).await? {
        return Err(Error::InvalidInput(format!(
            "{} cannot be moved under its own descendant",
            kind
        )));
    }
    Ok(())
}

// =============================================================================
// USER REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    /// Already validated and lowercased.
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default)]
pub struct ListUsersRequest {
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    /// Case-insensitive substring of email or display name
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

/// Repository for user accounts. Soft-deleted users are invisible to every
/// read method.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user. Fails with `Conflict` when the email is taken.
    async fn create(&self, req: CreateUserRequest) -> Result<User>;

    async fn get(&self, id: Uuid) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fetch a user with the password hash for credential checks.
    async fn get_credentials(&self, email: &str) -> Result<Option<UserCredentials>>;

    /// Same as [`get_credentials`](Self::get_credentials) but by id.
    async fn get_credentials_by_id(&self, id: Uuid) -> Result<Option<UserCredentials>>;

    async fn exists(&self, id: Uuid) -> Result<bool>;

    async fn list(&self, req: ListUsersRequest) -> Result<Page<User>>;

    async fn update(&self, id: Uuid, req: UpdateUserRequest) -> Result<User>;

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    async fn mark_email_verified(&self, id: Uuid) -> Result<()>;

    /// Soft delete: sets `deleted_at` and deactivates the account.
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

/// Repository for sessions and single-use account tokens. Raw tokens never
/// reach storage; callers pass SHA-256 hex digests.
#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session>;

    /// Resolve an unexpired session to its active user, touching
    /// `last_used_at`.
    async fn find_session(&self, token_hash: &str) -> Result<Option<(Session, User)>>;

    /// Returns whether a session was removed.
    async fn delete_session(&self, token_hash: &str) -> Result<bool>;

    /// Revoke every session of a user, optionally keeping one.
    async fn delete_user_sessions(&self, user_id: Uuid, keep: Option<Uuid>) -> Result<u64>;

    async fn purge_expired_sessions(&self) -> Result<u64>;

    /// Store a single-use token, replacing any earlier token of the same kind.
    async fn create_account_token(
        &self,
        user_id: Uuid,
        kind: AccountTokenKind,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Delete an unexpired token and return its user. Each token works once.
    async fn consume_account_token(
        &self,
        kind: AccountTokenKind,
        token_hash: &str,
    ) -> Result<Option<Uuid>>;
}

// =============================================================================
// ORGANIZATION REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

/// Repository for the organization forest and its memberships.
#[async_trait]
pub trait OrganizationRepository: TreeRepository {
    /// Create an organization. Fails with `Conflict` on a duplicate slug.
    async fn create(&self, req: CreateOrganizationRequest) -> Result<Organization>;

    async fn get(&self, id: Uuid) -> Result<Option<Organization>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Organization>>;

    /// Roots when `parent_id` is None, otherwise direct children of it.
    async fn list(
        &self,
        parent_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Organization>>;

    async fn update(&self, id: Uuid, req: UpdateOrganizationRequest) -> Result<Organization>;

    /// Delete a leaf organization. Fails with `Conflict` while children exist.
    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn children(&self, id: Uuid) -> Result<Vec<Organization>>;

    /// Nodes sharing the parent of `id`, excluding `id` itself.
    async fn siblings(&self, id: Uuid) -> Result<Vec<Organization>>;

    /// Chain from the root down to the direct parent.
    async fn ancestors(&self, id: Uuid) -> Result<Vec<TreeEntry<Organization>>>;

    async fn descendants(
        &self,
        id: Uuid,
        max_depth: i32,
    ) -> Result<Vec<TreeEntry<Organization>>>;

    /// Re-parent without validation; see [`ensure_valid_move`].
    async fn set_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<Organization>;

    /// Add a member or change an existing member's role.
    async fn upsert_member(&self, org_id: Uuid, user_id: Uuid, role: MemberRole) -> Result<()>;

    async fn remove_member(&self, org_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn list_members(&self, org_id: Uuid) -> Result<Vec<OrganizationMember>>;

    async fn member_role(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<MemberRole>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>>;
}

// =============================================================================
// TAXONOMY REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreateTaxonomyRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub hierarchical: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaxonomyRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    async fn create(&self, req: CreateTaxonomyRequest) -> Result<Taxonomy>;

    async fn get(&self, id: Uuid) -> Result<Option<Taxonomy>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Taxonomy>>;

    async fn list(&self, limit: i64, offset: i64) -> Result<Page<Taxonomy>>;

    async fn update(&self, id: Uuid, req: UpdateTaxonomyRequest) -> Result<Taxonomy>;

    /// Delete a taxonomy with all its terms and their post assignments.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CreateTermRequest {
    pub taxonomy_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTermRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

/// Repository for taxonomy terms and their assignment to posts.
#[async_trait]
pub trait TermRepository: TreeRepository {
    /// Fails with `Conflict` when the slug is taken within the taxonomy.
    async fn create(&self, req: CreateTermRequest) -> Result<Term>;

    async fn get(&self, id: Uuid) -> Result<Option<Term>>;

    async fn list(
        &self,
        taxonomy_id: Uuid,
        parent_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Term>>;

    async fn update(&self, id: Uuid, req: UpdateTermRequest) -> Result<Term>;

    /// Fails with `Conflict` while child terms exist.
    async fn delete(&self, id: Uuid) -> Result<()>;

    async fn children(&self, id: Uuid) -> Result<Vec<Term>>;

    async fn siblings(&self, id: Uuid) -> Result<Vec<Term>>;

    async fn ancestors(&self, id: Uuid) -> Result<Vec<TreeEntry<Term>>>;

    async fn descendants(&self, id: Uuid, max_depth: i32) -> Result<Vec<TreeEntry<Term>>>;

    async fn set_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<Term>;

    /// Replace the post's terms within one taxonomy.
    async fn set_post_terms(&self, post_id: Uuid, taxonomy_id: Uuid, term_ids: &[Uuid])
        -> Result<()>;

    async fn post_terms(&self, post_id: Uuid) -> Result<Vec<Term>>;
}

// =============================================================================
// POST REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreatePostRequest {
    pub author_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub featured_media_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub body: Option<String>,
    pub organization_id: Option<Uuid>,
    pub featured_media_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct ListPostsRequest {
    pub status: Option<PostStatus>,
    pub author_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub tag_slug: Option<String>,
    pub term_id: Option<Uuid>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    /// When set, restrict to published posts plus this user's own posts.
    pub visible_to: Option<Uuid>,
    /// Restrict to published posts (anonymous callers).
    pub published_only: bool,
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Fails with `Conflict` on a duplicate slug.
    async fn create(&self, req: CreatePostRequest) -> Result<Post>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Fetch by id, including soft-deleted posts.
    async fn get(&self, id: Uuid) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn list(&self, req: ListPostsRequest) -> Result<Page<Post>>;

    async fn update(&self, id: Uuid, req: UpdatePostRequest) -> Result<Post>;

    /// Change status. Publishing stamps `published_at` the first time only.
    async fn set_status(&self, id: Uuid, status: PostStatus) -> Result<Post>;

    async fn soft_delete(&self, id: Uuid) -> Result<()>;

    async fn restore(&self, id: Uuid) -> Result<Post>;

    /// Replace the post's tag set.
    async fn set_tags(&self, post_id: Uuid, tag_ids: &[Uuid]) -> Result<()>;

    async fn tags(&self, post_id: Uuid) -> Result<Vec<Tag>>;

    /// Full-text search over published posts, best match first.
    async fn search_fulltext(&self, query: &str, limit: i64, offset: i64) -> Result<Page<Post>>;

    /// Fetch the public posts among `ids`, in no particular order.
    async fn get_public_many(&self, ids: &[Uuid]) -> Result<Vec<Post>>;

    /// Page through public posts by id for reindexing.
    async fn list_public_after(&self, after: Option<Uuid>, limit: i64) -> Result<Vec<Post>>;

    /// Detach a deleted media item from every post using it.
    async fn clear_featured_media(&self, media_id: Uuid) -> Result<u64>;
}

// =============================================================================
// TAG REPOSITORY TRAITS
// =============================================================================

#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Fails with `Conflict` on a duplicate slug.
    async fn create(&self, name: &str, slug: &str) -> Result<Tag>;

    async fn get(&self, id: Uuid) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// Tags with post counts, optionally restricted to a name prefix.
    async fn list(
        &self,
        prefix: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<TagWithCount>>;

    async fn update(&self, id: Uuid, name: Option<&str>, slug: Option<&str>) -> Result<Tag>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Return the tag with this slug, creating it with `name` if missing.
    async fn get_or_create(&self, name: &str, slug: &str) -> Result<Tag>;
}

// =============================================================================
// COMMENT REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreateCommentRequest {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub status: CommentStatus,
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, req: CreateCommentRequest) -> Result<Comment>;

    async fn get(&self, id: Uuid) -> Result<Option<Comment>>;

    /// Comments on a post in creation order.
    async fn list_for_post(
        &self,
        post_id: Uuid,
        status: Option<CommentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Comment>>;

    async fn update_body(&self, id: Uuid, body: &str) -> Result<Comment>;

    async fn set_status(&self, id: Uuid, status: CommentStatus) -> Result<Comment>;

    /// Delete a comment and its replies.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// MENU REPOSITORY TRAITS
// =============================================================================

#[async_trait]
pub trait MenuRepository: Send + Sync {
    /// Fails with `Conflict` when the location is taken.
    async fn create(&self, name: &str, location: &str) -> Result<Menu>;

    async fn get(&self, id: Uuid) -> Result<Option<Menu>>;

    async fn get_by_location(&self, location: &str) -> Result<Option<Menu>>;

    async fn list(&self) -> Result<Vec<Menu>>;

    async fn update(&self, id: Uuid, name: Option<&str>, location: Option<&str>) -> Result<Menu>;

    /// Delete a menu with all its items.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CreateMenuItemRequest {
    pub menu_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub label: String,
    pub url: Option<String>,
    pub post_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
    /// Appended after the last sibling when None.
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMenuItemRequest {
    pub label: Option<String>,
    pub url: Option<String>,
    pub post_id: Option<Uuid>,
    pub term_id: Option<Uuid>,
}

#[async_trait]
pub trait MenuItemRepository: TreeRepository {
    async fn create(&self, req: CreateMenuItemRequest) -> Result<MenuItem>;

    async fn get(&self, id: Uuid) -> Result<Option<MenuItem>>;

    /// Every item of a menu, unordered.
    async fn list_for_menu(&self, menu_id: Uuid) -> Result<Vec<MenuItem>>;

    /// Replace the link fields; exactly one target must be set.
    async fn update(&self, id: Uuid, req: UpdateMenuItemRequest) -> Result<MenuItem>;

    /// Delete an item, promoting its children to its parent.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Re-parent and reposition without validation; see [`ensure_valid_move`].
    async fn set_parent(
        &self,
        id: Uuid,
        parent_id: Option<Uuid>,
        position: Option<i32>,
    ) -> Result<MenuItem>;
}

// =============================================================================
// MEDIA REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreateMediaRequest {
    /// Pre-generated so the storage path can embed it.
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub storage_path: String,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMediaRequest {
    pub uploader_id: Option<Uuid>,
    /// e.g. "image/"
    pub content_type_prefix: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, req: CreateMediaRequest) -> Result<Media>;

    async fn get(&self, id: Uuid) -> Result<Option<Media>>;

    async fn list(&self, req: ListMediaRequest) -> Result<Page<Media>>;

    async fn update(
        &self,
        id: Uuid,
        alt_text: Option<&str>,
        caption: Option<&str>,
    ) -> Result<Media>;

    /// Delete the row and return it so the blob can be cleaned up.
    async fn delete(&self, id: Uuid) -> Result<Media>;
}

// =============================================================================
// NOTIFICATION REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: JsonValue,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, req: CreateNotificationRequest) -> Result<Notification>;

    async fn get(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Newest first.
    async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Notification>>;

    /// Idempotent; keeps the first read timestamp.
    async fn mark_read(&self, id: Uuid) -> Result<Notification>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64>;

    async fn unread_count(&self, user_id: Uuid) -> Result<i64>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// ADDRESS REPOSITORY TRAITS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreateAddressRequest {
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
    pub label: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: String,
}

/// Nullable columns use `Option<Option<_>>`: `None` keeps the stored value,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateAddressRequest {
    pub label: Option<Option<String>>,
    pub line1: Option<String>,
    pub line2: Option<Option<String>>,
    pub city: Option<String>,
    pub region: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub country_code: Option<String>,
}

#[async_trait]
pub trait AddressRepository: Send + Sync {
    /// The first address of an owner becomes its primary address.
    async fn create(&self, req: CreateAddressRequest) -> Result<Address>;

    async fn get(&self, id: Uuid) -> Result<Option<Address>>;

    /// Primary first, then oldest first.
    async fn list_for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<Vec<Address>>;

    async fn update(&self, id: Uuid, req: UpdateAddressRequest) -> Result<Address>;

    /// Delete an address; if it was primary the oldest remaining one takes over.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Make this address the owner's only primary address.
    async fn set_primary(&self, id: Uuid) -> Result<Address>;
}

// =============================================================================
// JOB REPOSITORY TRAITS
// =============================================================================

/// Repository for the job queue and the failed-job table.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        job_type: JobType,
        payload: JsonValue,
        priority: i32,
        max_attempts: i32,
    ) -> Result<Uuid>;

    /// Queue unless a pending job with the same type and payload exists.
    async fn queue_deduplicated(
        &self,
        job_type: JobType,
        payload: JsonValue,
        priority: i32,
    ) -> Result<Option<Uuid>>;

    /// Claim the highest-priority, oldest pending job whose type is in
    /// `job_types`. An empty slice claims any type.
    async fn claim_next(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Record a failed attempt. Returns `Pending` when the job will be
    /// retried, `Failed` when it was parked in the failed-job table.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<JobStatus>;

    /// Park the job immediately, regardless of remaining attempts.
    async fn fail_permanently(&self, job_id: Uuid, error: &str) -> Result<()>;

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    async fn list(
        &self,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Job>>;

    async fn stats(&self) -> Result<QueueStats>;

    async fn pending_count(&self) -> Result<i64>;

    /// Return running jobs started before `older_than` to pending.
    async fn reset_stale(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Delete completed jobs finished before `older_than`.
    async fn cleanup_completed(&self, older_than: DateTime<Utc>) -> Result<u64>;

    async fn list_failed(&self, limit: i64, offset: i64) -> Result<Page<FailedJob>>;

    /// Requeue one failed job with fresh attempts. Returns the new job id.
    async fn retry_failed(&self, failed_id: Uuid) -> Result<Uuid>;

    async fn retry_all_failed(&self) -> Result<u64>;

    async fn forget_failed(&self, failed_id: Uuid) -> Result<bool>;

    async fn flush_failed(&self) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory parent map standing in for a tree table.
    struct ParentMap(HashMap<Uuid, Option<Uuid>>);

    #[async_trait]
    impl TreeRepository for ParentMap {
        fn node_kind(&self) -> &'static str {
            "organization"
        }

        async fn node_exists(&self, id: Uuid) -> Result<bool> {
            Ok(self.0.contains_key(&id))
        }

        async fn is_descendant(&self, ancestor: Uuid, candidate: Uuid) -> Result<bool> {
            let mut current = self.0.get(&candidate).copied().flatten();
            while let Some(p) = current {
                if p == ancestor {
                    return Ok(true);
                }
                current = self.0.get(&p).copied().flatten();
            }
            Ok(false)
        }
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    /// 1 -> 2 -> 3, and 4 as a separate root.
    fn forest() -> ParentMap {
        ParentMap(HashMap::from([
            (id(1), None),
            (id(2), Some(id(1))),
            (id(3), Some(id(2))),
            (id(4), None),
        ]))
    }

    #[tokio::test]
    async fn move_to_root_is_always_valid() {
        assert!(ensure_valid_move(&forest(), id(3), None).await.is_ok());
    }

    #[tokio::test]
    async fn move_under_self_is_rejected() {
        let err = ensure_valid_move(&forest(), id(2), Some(id(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("its own parent"));
    }

    #[tokio::test]
    async fn move_under_descendant_is_rejected() {
        let err = ensure_valid_move(&forest(), id(1), Some(id(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("descendant"));
    }

    #[tokio::test]
    async fn move_under_missing_parent_is_not_found() {
        let err = ensure_valid_move(&forest(), id(2), Some(id(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn move_across_trees_is_valid() {
        assert!(ensure_valid_move(&forest(), id(2), Some(id(4))).await.is_ok());
    }

    #[tokio::test]
    async fn move_under_ancestor_is_valid() {
        assert!(ensure_valid_move(&forest(), id(3), Some(id(1))).await.is_ok());
    }
}
