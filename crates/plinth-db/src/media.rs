//! Media metadata repository. Blob bytes are handled by [`crate::file_storage`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use plinth_core::validation::{clamp_limit, clamp_offset};
use plinth_core::{
    CreateMediaRequest, Error, ListMediaRequest, Media, MediaRepository, Page, Result,
};

use crate::escape_like;

const MEDIA_COLUMNS: &str = "id, uploader_id, filename, content_type, size_bytes, content_hash, \
                             storage_path, alt_text, caption, created_at, updated_at";

/// PostgreSQL implementation of MediaRepository.
pub struct PgMediaRepository {
    pool: Pool<Postgres>,
}

impl PgMediaRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_media_row(row: &PgRow) -> Media {
        Media {
            id: row.get("id"),
            uploader_id: row.get("uploader_id"),
            filename: row.get("filename"),
            content_type: row.get("content_type"),
            size_bytes: row.get("size_bytes"),
            content_hash: row.get("content_hash"),
            storage_path: row.get("storage_path"),
            alt_text: row.get("alt_text"),
            caption: row.get("caption"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl MediaRepository for PgMediaRepository {
    async fn create(&self, req: CreateMediaRequest) -> Result<Media> {
        let row = sqlx::query(&format!(
            "INSERT INTO media (id, uploader_id, filename, content_type, size_bytes, content_hash,
                                storage_path, alt_text, caption, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             RETURNING {}",
            MEDIA_COLUMNS
        ))
        .bind(req.id)
        .bind(req.uploader_id)
        .bind(&req.filename)
        .bind(&req.content_type)
        .bind(req.size_bytes)
        .bind(&req.content_hash)
        .bind(&req.storage_path)
        .bind(&req.alt_text)
        .bind(&req.caption)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let media = Self::parse_media_row(&row);
        info!(
            subsystem = "db",
            component = "media",
            op = "create",
            media_id = %media.id,
            size_bytes = media.size_bytes,
            content_type = %media.content_type,
            "Media stored"
        );
        Ok(media)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Media>> {
        let row = sqlx::query(&format!("SELECT {} FROM media WHERE id = $1", MEDIA_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_media_row))
    }

    async fn list(&self, req: ListMediaRequest) -> Result<Page<Media>> {
        let prefix = req
            .content_type_prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}%", escape_like(p)));

        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM media
             WHERE ($1::uuid IS NULL OR uploader_id = $1)
               AND ($2::text IS NULL OR content_type LIKE $2)
             ORDER BY created_at DESC, id
             LIMIT $3 OFFSET $4",
            MEDIA_COLUMNS
        ))
        .bind(req.uploader_id)
        .bind(prefix)
        .bind(clamp_limit(req.limit))
        .bind(clamp_offset(req.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        Ok(Page::new(
            rows.iter().map(Self::parse_media_row).collect(),
            total,
        ))
    }

    async fn update(
        &self,
        id: Uuid,
        alt_text: Option<&str>,
        caption: Option<&str>,
    ) -> Result<Media> {
        let row = sqlx::query(&format!(
            "UPDATE media SET alt_text = COALESCE($2, alt_text), caption = COALESCE($3, caption),
                              updated_at = $4
             WHERE id = $1
             RETURNING {}",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .bind(alt_text)
        .bind(caption)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("Media {} not found", id)))?;

        Ok(Self::parse_media_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<Media> {
        // Posts featuring this media are detached by ON DELETE SET NULL.
        let row = sqlx::query(&format!("DELETE FROM media WHERE id = $1 RETURNING {}", MEDIA_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("Media {} not found", id)))?;

        Ok(Self::parse_media_row(&row))
    }
}
