//! Posts, their lifecycle, tags and search.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use plinth_core::defaults::{NAME_MAX_LENGTH, SLUG_SUFFIX_ATTEMPTS};
use plinth_core::slug::{resolve_slug, with_suffix};
use plinth_core::validation::{validate_optional, validate_required};
use plinth_core::{
    validate_slug, CreatePostRequest, Error, JobType, ListPostsRequest, MediaRepository,
    OrganizationRepository, Page, Post, PostRepository, PostStatus, Result, Tag,
    UpdatePostRequest, User,
};
use plinth_db::Database;
use plinth_search::{HybridSearchEngine, PostSearchResults};

use super::tags::TagService;
use super::{enqueue, ensure_owner_or_moderator, forbidden, page_bounds, require};

const EXCERPT_MAX_LENGTH: usize = 1_000;

#[derive(Debug, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    #[serde(default)]
    pub body: String,
    pub organization_id: Option<Uuid>,
    pub featured_media_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub body: Option<String>,
    pub organization_id: Option<Uuid>,
    pub featured_media_id: Option<Uuid>,
}

/// Query filters for post listings.
#[derive(Debug, Default, Deserialize)]
pub struct PostFilters {
    pub status: Option<PostStatus>,
    pub author_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    /// Tag slug
    pub tag: Option<String>,
    pub term_id: Option<Uuid>,
    /// Substring of the title
    pub q: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Whether `actor` may see `post`. Drafts, archived and deleted posts are
/// visible only to their author and moderators.
pub fn can_view(actor: Option<&User>, post: &Post) -> bool {
    post.is_public()
        || actor.is_some_and(|u| u.id == post.author_id || u.role.can_moderate())
}

/// Map listing filters onto a repository request for the given caller.
pub fn scoped_list_request(actor: Option<&User>, filters: PostFilters) -> ListPostsRequest {
    let moderator = actor.is_some_and(|u| u.role.can_moderate());
    let (limit, offset) = page_bounds(filters.limit, filters.offset);
    ListPostsRequest {
        status: filters.status,
        author_id: filters.author_id,
        organization_id: filters.organization_id,
        tag_slug: filters.tag,
        term_id: filters.term_id,
        search: filters.q.filter(|q| !q.trim().is_empty()),
        visible_to: match actor {
            Some(u) if !moderator => Some(u.id),
            _ => None,
        },
        published_only: actor.is_none(),
        include_deleted: moderator && filters.include_deleted,
        limit: Some(limit),
        offset: Some(offset),
    }
}

#[derive(Clone)]
pub struct PostService {
    db: Database,
    search: HybridSearchEngine,
    tags: TagService,
}

impl PostService {
    pub fn new(db: Database, search: HybridSearchEngine) -> Self {
        Self {
            tags: TagService::new(db.clone()),
            db,
            search,
        }
    }

    #[instrument(skip(self, actor, input), fields(subsystem = "api", component = "posts", op = "create"))]
    pub async fn create(&self, actor: &User, input: CreatePostInput) -> Result<Post> {
        if !actor.role.can_author() {
            return Err(forbidden("subscribers cannot create posts"));
        }
        let title = validate_required("title", &input.title, NAME_MAX_LENGTH)?;
        let excerpt = validate_optional("excerpt", input.excerpt.as_deref(), EXCERPT_MAX_LENGTH)?;
        self.check_references(input.organization_id, input.featured_media_id)
            .await?;

        let slug = match input.slug.as_deref() {
            Some(explicit) => resolve_slug(Some(explicit), &title)?,
            None => self.unique_slug(&resolve_slug(None, &title)?).await?,
        };

        let post = self
            .db
            .posts
            .create(CreatePostRequest {
                author_id: actor.id,
                organization_id: input.organization_id,
                title,
                slug,
                excerpt,
                body: input.body,
                featured_media_id: input.featured_media_id,
            })
            .await?;

        if let Some(names) = input.tags {
            self.apply_tags(post.id, &names).await?;
        }
        self.queue_index(post.id).await;

        info!(post_id = %post.id, slug = %post.slug, "Post created");
        Ok(post)
    }

    /// First free slug among `base`, `base-2`, `base-3`, ...
    async fn unique_slug(&self, base: &str) -> Result<String> {
        if !self.db.posts.slug_exists(base).await? {
            return Ok(base.to_string());
        }
        for n in 2..=SLUG_SUFFIX_ATTEMPTS + 1 {
            let candidate = with_suffix(base, n);
            if !self.db.posts.slug_exists(&candidate).await? {
                debug!(slug = %candidate, "Slug taken, using suffix");
                return Ok(candidate);
            }
        }
        Err(Error::Conflict(format!(
            "no free slug derived from '{}'",
            base
        )))
    }

    async fn check_references(&self, organization_id: Option<Uuid>, media_id: Option<Uuid>) -> Result<()> {
        if let Some(org_id) = organization_id {
            require(self.db.organizations.get(org_id).await?, "Organization", org_id)?;
        }
        if let Some(media_id) = media_id {
            require(self.db.media.get(media_id).await?, "Media", media_id)?;
        }
        Ok(())
    }

    pub async fn get(&self, actor: Option<&User>, id: Uuid) -> Result<Post> {
        let post = require(self.db.posts.get(id).await?, "Post", id)?;
        if !can_view(actor, &post) {
            return Err(Error::NotFound(format!("Post {} not found", id)));
        }
        Ok(post)
    }

    pub async fn get_by_slug(&self, actor: Option<&User>, slug: &str) -> Result<Post> {
        let post = require(self.db.posts.get_by_slug(slug).await?, "Post", slug)?;
        if !can_view(actor, &post) {
            return Err(Error::NotFound(format!("Post {} not found", slug)));
        }
        Ok(post)
    }

    pub async fn list(&self, actor: Option<&User>, filters: PostFilters) -> Result<Page<Post>> {
        self.db.posts.list(scoped_list_request(actor, filters)).await
    }

    pub async fn update(&self, actor: &User, id: Uuid, input: UpdatePostInput) -> Result<Post> {
        let existing = self.editable(actor, id).await?;
        let title = validate_optional("title", input.title.as_deref(), NAME_MAX_LENGTH)?;
        let excerpt = validate_optional("excerpt", input.excerpt.as_deref(), EXCERPT_MAX_LENGTH)?;
        if let Some(slug) = &input.slug {
            validate_slug(slug)?;
        }
        self.check_references(input.organization_id, input.featured_media_id)
            .await?;

        let post = self
            .db
            .posts
            .update(
                existing.id,
                UpdatePostRequest {
                    title,
                    slug: input.slug,
                    excerpt,
                    body: input.body,
                    organization_id: input.organization_id,
                    featured_media_id: input.featured_media_id,
                },
            )
            .await?;
        self.queue_index(post.id).await;
        Ok(post)
    }

    pub async fn publish(&self, actor: &User, id: Uuid) -> Result<Post> {
        self.transition(actor, id, PostStatus::Published).await
    }

    pub async fn unpublish(&self, actor: &User, id: Uuid) -> Result<Post> {
        self.transition(actor, id, PostStatus::Draft).await
    }

    pub async fn archive(&self, actor: &User, id: Uuid) -> Result<Post> {
        self.transition(actor, id, PostStatus::Archived).await
    }

    async fn transition(&self, actor: &User, id: Uuid, status: PostStatus) -> Result<Post> {
        let existing = self.editable(actor, id).await?;
        if existing.deleted_at.is_some() {
            return Err(Error::InvalidInput(
                "restore the post before changing its status".to_string(),
            ));
        }
        let post = self.db.posts.set_status(id, status).await?;
        self.queue_index(post.id).await;
        info!(post_id = %id, status = %status, "Post status changed");
        Ok(post)
    }

    /// Soft delete.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        self.editable(actor, id).await?;
        self.db.posts.soft_delete(id).await?;
        enqueue(&self.db, JobType::SearchRemove, json!({ "post_id": id })).await;
        info!(post_id = %id, "Post deleted");
        Ok(())
    }

    pub async fn restore(&self, actor: &User, id: Uuid) -> Result<Post> {
        self.editable(actor, id).await?;
        let post = self.db.posts.restore(id).await?;
        self.queue_index(post.id).await;
        Ok(post)
    }

    /// Replace a post's tags by name, creating missing tags.
    pub async fn set_tags(&self, actor: &User, id: Uuid, names: &[String]) -> Result<Vec<Tag>> {
        self.editable(actor, id).await?;
        self.apply_tags(id, names).await?;
        self.queue_index(id).await;
        self.db.posts.tags(id).await
    }

    pub async fn tags(&self, actor: Option<&User>, id: Uuid) -> Result<Vec<Tag>> {
        self.get(actor, id).await?;
        self.db.posts.tags(id).await
    }

    async fn apply_tags(&self, post_id: Uuid, names: &[String]) -> Result<()> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let tag = self.tags.get_or_create(name).await?;
            if !ids.contains(&tag.id) {
                ids.push(tag.id);
            }
        }
        self.db.posts.set_tags(post_id, &ids).await
    }

    pub async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<PostSearchResults> {
        self.search.search_posts(query, limit, offset).await
    }

    /// Load a post the actor may modify.
    async fn editable(&self, actor: &User, id: Uuid) -> Result<Post> {
        let post = require(self.db.posts.get(id).await?, "Post", id)?;
        ensure_owner_or_moderator(actor, post.author_id)?;
        Ok(post)
    }

    async fn queue_index(&self, post_id: Uuid) {
        enqueue(&self.db, JobType::SearchIndex, json!({ "post_id": post_id })).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::user;
    use chrono::Utc;
    use plinth_core::UserRole;

    fn post(author_id: Uuid, status: PostStatus) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id,
            organization_id: None,
            title: "T".into(),
            slug: "t".into(),
            excerpt: None,
            body: String::new(),
            status,
            published_at: None,
            featured_media_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn drafts_are_private_to_author_and_moderators() {
        let author = user(UserRole::Author);
        let draft = post(author.id, PostStatus::Draft);

        assert!(!can_view(None, &draft));
        assert!(can_view(Some(&author), &draft));
        assert!(!can_view(Some(&user(UserRole::Author)), &draft));
        assert!(can_view(Some(&user(UserRole::Editor)), &draft));
    }

    #[test]
    fn deleted_posts_are_not_public() {
        let mut p = post(Uuid::new_v4(), PostStatus::Published);
        assert!(can_view(None, &p));
        p.deleted_at = Some(Utc::now());
        assert!(!can_view(None, &p));
    }

    #[test]
    fn listing_scope_follows_caller() {
        let anon = scoped_list_request(None, PostFilters::default());
        assert!(anon.published_only);
        assert!(anon.visible_to.is_none());

        let author = user(UserRole::Author);
        let own = scoped_list_request(
            Some(&author),
            PostFilters {
                include_deleted: true,
                ..Default::default()
            },
        );
        assert!(!own.published_only);
        assert_eq!(own.visible_to, Some(author.id));
        assert!(!own.include_deleted);

        let editor = user(UserRole::Editor);
        let all = scoped_list_request(
            Some(&editor),
            PostFilters {
                include_deleted: true,
                q: Some("  ".into()),
                ..Default::default()
            },
        );
        assert!(all.visible_to.is_none());
        assert!(all.include_deleted);
        assert!(all.search.is_none());
    }
}
