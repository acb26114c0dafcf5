//! In-app notifications.

use uuid::Uuid;

use plinth_core::{
    CreateNotificationRequest, Notification, NotificationRepository, Page, Result, User,
};
use plinth_db::Database;

use super::{forbidden, require};

#[derive(Clone)]
pub struct NotificationService {
    db: Database,
}

impl NotificationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Internal: other services notify users through this.
    pub async fn create(&self, req: CreateNotificationRequest) -> Result<Notification> {
        self.db.notifications.create(req).await
    }

    pub async fn list(
        &self,
        actor: &User,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Notification>> {
        self.db
            .notifications
            .list(actor.id, unread_only, limit, offset)
            .await
    }

    pub async fn unread_count(&self, actor: &User) -> Result<i64> {
        self.db.notifications.unread_count(actor.id).await
    }

    pub async fn mark_read(&self, actor: &User, id: Uuid) -> Result<Notification> {
        self.owned(actor, id).await?;
        self.db.notifications.mark_read(id).await
    }

    pub async fn mark_all_read(&self, actor: &User) -> Result<u64> {
        self.db.notifications.mark_all_read(actor.id).await
    }

    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        self.owned(actor, id).await?;
        self.db.notifications.delete(id).await
    }

    async fn owned(&self, actor: &User, id: Uuid) -> Result<Notification> {
        let notification = require(self.db.notifications.get(id).await?, "Notification", id)?;
        if notification.user_id != actor.id {
            return Err(forbidden("notification belongs to another user"));
        }
        Ok(notification)
    }
}
