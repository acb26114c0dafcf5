//! Tag repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use plinth_core::{new_v7, Error, Page, Result, Tag, TagRepository, TagWithCount};

use crate::escape_like;

/// PostgreSQL implementation of TagRepository.
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub(crate) fn parse_tag_row(row: &PgRow) -> Tag {
        Tag {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn create(&self, name: &str, slug: &str) -> Result<Tag> {
        let row = sqlx::query(
            "INSERT INTO tags (id, name, slug, created_at) VALUES ($1, $2, $3, $4)
             RETURNING id, name, slug, created_at",
        )
        .bind(new_v7())
        .bind(name)
        .bind(slug)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(e).on_unique_violation(format!("tag '{}' already exists", slug))
        })?;

        Ok(Self::parse_tag_row(&row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_tag_row))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, slug, created_at FROM tags WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_tag_row))
    }

    async fn list(
        &self,
        prefix: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<TagWithCount>> {
        let pattern = prefix
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}%", escape_like(p)));

        // Only live posts count towards a tag.
        let rows = sqlx::query(
            "SELECT t.id, t.name, t.slug, t.created_at,
                    COUNT(p.id) AS post_count,
                    COUNT(*) OVER () AS total_count
             FROM tags t
             LEFT JOIN post_tags pt ON pt.tag_id = t.id
             LEFT JOIN posts p ON p.id = pt.post_id AND p.deleted_at IS NULL
             WHERE ($1::text IS NULL OR t.name ILIKE $1)
             GROUP BY t.id
             ORDER BY t.name, t.id
             LIMIT $2 OFFSET $3",
        )
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let tags = rows
            .iter()
            .map(|row| TagWithCount {
                tag: Self::parse_tag_row(row),
                post_count: row.get("post_count"),
            })
            .collect();
        Ok(Page::new(tags, total))
    }

    async fn update(&self, id: Uuid, name: Option<&str>, slug: Option<&str>) -> Result<Tag> {
        let row = sqlx::query(
            "UPDATE tags SET name = COALESCE($2, name), slug = COALESCE($3, slug)
             WHERE id = $1
             RETURNING id, name, slug, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e).on_unique_violation("tag slug is already taken"))?
        .ok_or_else(|| Error::NotFound(format!("Tag {} not found", id)))?;

        Ok(Self::parse_tag_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound(format!("Tag {} not found", id)));
        }
        Ok(())
    }

    async fn get_or_create(&self, name: &str, slug: &str) -> Result<Tag> {
        // The no-op update makes RETURNING yield the existing row too.
        let row = sqlx::query(
            "INSERT INTO tags (id, name, slug, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
             RETURNING id, name, slug, created_at",
        )
        .bind(new_v7())
        .bind(name)
        .bind(slug)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_tag_row(&row))
    }
}
