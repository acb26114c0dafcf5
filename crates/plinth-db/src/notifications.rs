//! Notification repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use plinth_core::{
    new_v7, CreateNotificationRequest, Error, Notification, NotificationRepository, Page, Result,
};

use crate::get_enum;

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, data, read_at, created_at";

/// PostgreSQL implementation of NotificationRepository.
pub struct PgNotificationRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_notification_row(row: &PgRow) -> Result<Notification> {
        Ok(Notification {
            id: row.get("id"),
            user_id: row.get("user_id"),
            kind: get_enum(row, "kind")?,
            title: row.get("title"),
            body: row.get("body"),
            data: row.get("data"),
            read_at: row.get("read_at"),
            created_at: row.get("created_at"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("Notification {} not found", id))
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, req: CreateNotificationRequest) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "INSERT INTO notifications (id, user_id, kind, title, body, data, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.user_id)
        .bind(req.kind.as_str())
        .bind(&req.title)
        .bind(&req.body)
        .bind(&req.data)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let err = Error::Database(e);
            if err.is_foreign_key_violation() {
                Error::NotFound(format!("User {} not found", req.user_id))
            } else {
                err
            }
        })?;

        let notification = Self::parse_notification_row(&row)?;
        debug!(
            subsystem = "db",
            component = "notifications",
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            "Notification created"
        );
        Ok(notification)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_notification_row).transpose()
    }

    async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM notifications
             WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Self::parse_notification_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total))
    }

    async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let row = sqlx::query(&format!(
            "UPDATE notifications SET read_at = COALESCE(read_at, $2)
             WHERE id = $1
             RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_notification_row(&row)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE notifications SET read_at = $2 WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();
        Ok(updated)
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        if deleted == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}
