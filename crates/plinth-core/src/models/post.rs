use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publication status of a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

string_enum!(PostStatus {
    Draft => "draft",
    Published => "published",
    Archived => "archived",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub status: PostStatus,
    /// Set on first publish and kept across unpublish/republish.
    pub published_at: Option<DateTime<Utc>>,
    pub featured_media_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Only published, non-deleted posts are public and searchable.
    pub fn is_public(&self) -> bool {
        self.status == PostStatus::Published && self.deleted_at.is_none()
    }
}

/// The subset of a post pushed to the search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDocument {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub body: String,
    pub author_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub tags: Vec<String>,
    /// Unix seconds, sortable in the engine.
    pub published_at: Option<i64>,
}

impl PostDocument {
    pub fn from_post(post: &Post, tags: Vec<String>) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            slug: post.slug.clone(),
            excerpt: post.excerpt.clone(),
            body: post.body.clone(),
            author_id: post.author_id,
            organization_id: post.organization_id,
            tags,
            published_at: post.published_at.map(|t| t.timestamp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(status: PostStatus) -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::nil(),
            author_id: Uuid::nil(),
            organization_id: None,
            title: "Hello".to_string(),
            slug: "hello".to_string(),
            excerpt: None,
            body: "Body".to_string(),
            status,
            published_at: Some(now),
            featured_media_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_only_published_undeleted_posts_are_public() {
        assert!(post(PostStatus::Published).is_public());
        assert!(!post(PostStatus::Draft).is_public());
        assert!(!post(PostStatus::Archived).is_public());

        let mut deleted = post(PostStatus::Published);
        deleted.deleted_at = Some(Utc::now());
        assert!(!deleted.is_public());
    }

    #[test]
    fn test_document_uses_unix_seconds() {
        let p = post(PostStatus::Published);
        let doc = PostDocument::from_post(&p, vec!["rust".to_string()]);
        assert_eq!(doc.published_at, p.published_at.map(|t| t.timestamp()));
        assert_eq!(doc.tags, vec!["rust"]);
    }

    #[test]
    fn test_status_default_is_draft() {
        assert_eq!(PostStatus::default(), PostStatus::Draft);
        assert_eq!(PostStatus::Archived.to_string(), "archived");
    }
}
