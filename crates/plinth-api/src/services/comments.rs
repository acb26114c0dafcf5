//! Comments and moderation.

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use plinth_core::defaults::COMMENT_MAX_LENGTH;
use plinth_core::validation::validate_required;
use plinth_core::{
    Comment, CommentRepository, CommentStatus, CreateCommentRequest, CreateNotificationRequest,
    Error, NotificationKind, Page, Post, PostRepository, Result, User, UserRepository,
};
use plinth_db::Database;

use super::notifications::NotificationService;
use super::posts::can_view;
use super::{ensure_moderator, ensure_owner_or_moderator, forbidden, require};
use crate::email::{new_comment_email, EmailService};

#[derive(Debug, Deserialize)]
pub struct CreateCommentInput {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

/// Status a new comment starts in. The post's author and moderators skip
/// the queue.
pub fn initial_status(actor: &User, post: &Post) -> CommentStatus {
    if actor.id == post.author_id || actor.role.can_moderate() {
        CommentStatus::Approved
    } else {
        CommentStatus::Pending
    }
}

#[derive(Clone)]
pub struct CommentService {
    db: Database,
    notifications: NotificationService,
    email: EmailService,
}

impl CommentService {
    pub fn new(db: Database, notifications: NotificationService, email: EmailService) -> Self {
        Self {
            db,
            notifications,
            email,
        }
    }

    #[instrument(skip(self, actor, input), fields(subsystem = "api", component = "comments", op = "create"))]
    pub async fn create(&self, actor: &User, post_id: Uuid, input: CreateCommentInput) -> Result<Comment> {
        let body = validate_required("body", &input.body, COMMENT_MAX_LENGTH)?;
        let post = require(self.db.posts.get(post_id).await?, "Post", post_id)?;
        if !post.is_public() {
            return Err(Error::NotFound(format!("Post {} not found", post_id)));
        }

        let parent = match input.parent_id {
            Some(parent_id) => {
                let parent = require(self.db.comments.get(parent_id).await?, "Comment", parent_id)?;
                if parent.post_id != post_id {
                    return Err(Error::InvalidInput(
                        "parent comment belongs to another post".to_string(),
                    ));
                }
                Some(parent)
            }
            None => None,
        };

        let comment = self
            .db
            .comments
            .create(CreateCommentRequest {
                post_id,
                author_id: actor.id,
                parent_id: input.parent_id,
                body,
                status: initial_status(actor, &post),
            })
            .await?;
        info!(comment_id = %comment.id, status = %comment.status, "Comment created");

        self.notify(actor, &post, parent.as_ref(), &comment).await;
        Ok(comment)
    }

    /// Tell the post's author (in-app and by email) and the replied-to
    /// commenter (in-app). Failures here never fail the comment.
    async fn notify(&self, actor: &User, post: &Post, parent: Option<&Comment>, comment: &Comment) {
        let data = json!({
            "post_id": post.id,
            "comment_id": comment.id,
            "author_id": actor.id,
        });

        if post.author_id != actor.id {
            let created = self
                .notifications
                .create(CreateNotificationRequest {
                    user_id: post.author_id,
                    kind: NotificationKind::Comment,
                    title: format!("New comment on \"{}\"", post.title),
                    body: format!("{} commented on your post.", actor.display_name),
                    data: data.clone(),
                })
                .await;
            if let Err(e) = created {
                warn!(error = %e, "Failed to create comment notification");
            }

            match self.db.users.get(post.author_id).await {
                Ok(Some(author)) => {
                    self.email.dispatch(new_comment_email(
                        self.email.base_url(),
                        &author.email,
                        &actor.display_name,
                        &post.title,
                        &post.slug,
                        &comment.body,
                    ));
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to load post author for email"),
            }
        }

        if let Some(parent) = parent {
            if parent.author_id != actor.id && parent.author_id != post.author_id {
                let created = self
                    .notifications
                    .create(CreateNotificationRequest {
                        user_id: parent.author_id,
                        kind: NotificationKind::Reply,
                        title: format!("New reply on \"{}\"", post.title),
                        body: format!("{} replied to your comment.", actor.display_name),
                        data,
                    })
                    .await;
                if let Err(e) = created {
                    warn!(error = %e, "Failed to create reply notification");
                }
            }
        }
    }

    /// Unapproved comments are visible to their author and moderators.
    pub async fn get(&self, actor: Option<&User>, id: Uuid) -> Result<Comment> {
        let comment = require(self.db.comments.get(id).await?, "Comment", id)?;
        let visible = comment.status == CommentStatus::Approved
            || actor.is_some_and(|u| u.id == comment.author_id || u.role.can_moderate());
        if !visible {
            return Err(Error::NotFound(format!("Comment {} not found", id)));
        }
        Ok(comment)
    }

    /// Flat list in creation order. Non-moderators only see approved ones.
    pub async fn list_for_post(
        &self,
        actor: Option<&User>,
        post_id: Uuid,
        status: Option<CommentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Comment>> {
        let post = require(self.db.posts.get(post_id).await?, "Post", post_id)?;
        if !can_view(actor, &post) {
            return Err(Error::NotFound(format!("Post {} not found", post_id)));
        }
        let status = if actor.is_some_and(|u| u.role.can_moderate()) {
            status
        } else {
            Some(CommentStatus::Approved)
        };
        self.db
            .comments
            .list_for_post(post_id, status, limit, offset)
            .await
    }

    pub async fn update(&self, actor: &User, id: Uuid, body: &str) -> Result<Comment> {
        let comment = require(self.db.comments.get(id).await?, "Comment", id)?;
        if comment.author_id != actor.id {
            return Err(forbidden("only the author may edit a comment"));
        }
        let body = validate_required("body", body, COMMENT_MAX_LENGTH)?;
        self.db.comments.update_body(id, &body).await
    }

    pub async fn set_status(&self, actor: &User, id: Uuid, status: CommentStatus) -> Result<Comment> {
        ensure_moderator(actor)?;
        let comment = self.db.comments.set_status(id, status).await?;
        info!(comment_id = %id, status = %status, "Comment moderated");
        Ok(comment)
    }

    /// Delete a comment with its replies.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        let comment = require(self.db.comments.get(id).await?, "Comment", id)?;
        ensure_owner_or_moderator(actor, comment.author_id)?;
        self.db.comments.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tests::user;
    use chrono::Utc;
    use plinth_core::{PostStatus, UserRole};

    fn post_by(author_id: Uuid) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id,
            organization_id: None,
            title: "T".into(),
            slug: "t".into(),
            excerpt: None,
            body: String::new(),
            status: PostStatus::Published,
            published_at: Some(Utc::now()),
            featured_media_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn moderation_defaults() {
        let author = user(UserRole::Author);
        let post = post_by(author.id);

        assert_eq!(initial_status(&author, &post), CommentStatus::Approved);
        assert_eq!(initial_status(&user(UserRole::Editor), &post), CommentStatus::Approved);
        assert_eq!(initial_status(&user(UserRole::Admin), &post), CommentStatus::Approved);
        assert_eq!(initial_status(&user(UserRole::Subscriber), &post), CommentStatus::Pending);
        assert_eq!(initial_status(&user(UserRole::Author), &post), CommentStatus::Pending);
    }
}
