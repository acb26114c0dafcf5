//! Comment repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use plinth_core::{
    new_v7, Comment, CommentRepository, CommentStatus, CreateCommentRequest, Error, Page, Result,
};

use crate::get_enum;

const COMMENT_COLUMNS: &str = "id, post_id, author_id, parent_id, body, status, created_at, updated_at";

/// PostgreSQL implementation of CommentRepository.
pub struct PgCommentRepository {
    pool: Pool<Postgres>,
}

impl PgCommentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_comment_row(row: &PgRow) -> Result<Comment> {
        Ok(Comment {
            id: row.get("id"),
            post_id: row.get("post_id"),
            author_id: row.get("author_id"),
            parent_id: row.get("parent_id"),
            body: row.get("body"),
            status: get_enum(row, "status")?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("Comment {} not found", id))
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn create(&self, req: CreateCommentRequest) -> Result<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments (id, post_id, author_id, parent_id, body, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.post_id)
        .bind(req.author_id)
        .bind(req.parent_id)
        .bind(&req.body)
        .bind(req.status.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let err = Error::Database(e);
            if err.is_foreign_key_violation() {
                Error::NotFound("post or parent comment not found".to_string())
            } else {
                err
            }
        })?;

        Self::parse_comment_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(&format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_comment_row).transpose()
    }

    async fn list_for_post(
        &self,
        post_id: Uuid,
        status: Option<CommentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM comments
             WHERE post_id = $1 AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at, id
             LIMIT $3 OFFSET $4",
            COMMENT_COLUMNS
        ))
        .bind(post_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let comments = rows
            .iter()
            .map(Self::parse_comment_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(comments, total))
    }

    async fn update_body(&self, id: Uuid, body: &str) -> Result<Comment> {
        let row = sqlx::query(&format!(
            "UPDATE comments SET body = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(id)
        .bind(body)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_comment_row(&row)
    }

    async fn set_status(&self, id: Uuid, status: CommentStatus) -> Result<Comment> {
        let row = sqlx::query(&format!(
            "UPDATE comments SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_comment_row(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        // Replies cascade through parent_id.
        let deleted = sqlx::query("DELETE FROM comments WHERE id = $1")
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
