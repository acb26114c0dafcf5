//! Post repository implementation.
//!
//! Posts are soft-deleted. A generated `search_vector` column backs the SQL
//! full-text fallback used when the search engine is unavailable.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use plinth_core::validation::{clamp_limit, clamp_offset};
use plinth_core::{
    new_v7, CreatePostRequest, Error, ListPostsRequest, Page, Post, PostRepository, PostStatus,
    Result, Tag, UpdatePostRequest,
};

use crate::tags::PgTagRepository;
use crate::{escape_like, get_enum};

const POST_COLUMNS: &str = "id, author_id, organization_id, title, slug, excerpt, body, status, \
                            published_at, featured_media_id, created_at, updated_at, deleted_at";

/// PostgreSQL implementation of PostRepository.
pub struct PgPostRepository {
    pool: Pool<Postgres>,
}

impl PgPostRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_post_row(row: &PgRow) -> Result<Post> {
        Ok(Post {
            id: row.get("id"),
            author_id: row.get("author_id"),
            organization_id: row.get("organization_id"),
            title: row.get("title"),
            slug: row.get("slug"),
            excerpt: row.get("excerpt"),
            body: row.get("body"),
            status: get_enum(row, "status")?,
            published_at: row.get("published_at"),
            featured_media_id: row.get("featured_media_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("Post {} not found", id))
    }

    /// Map a foreign key failure on write to the referenced entity.
    fn reference_error(err: sqlx::Error) -> Error {
        let err = Error::Database(err);
        if err.is_foreign_key_violation() {
            Error::InvalidInput("referenced organization or media does not exist".to_string())
        } else {
            err.on_unique_violation("slug is already taken")
        }
    }

    fn page_from_rows(rows: &[PgRow]) -> Result<Page<Post>> {
        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let posts = rows
            .iter()
            .map(Self::parse_post_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(posts, total))
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn create(&self, req: CreatePostRequest) -> Result<Post> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO posts (id, author_id, organization_id, title, slug, excerpt, body,
                                status, featured_media_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'draft', $8, $9, $9)
             RETURNING {}",
            POST_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.author_id)
        .bind(req.organization_id)
        .bind(&req.title)
        .bind(&req.slug)
        .bind(&req.excerpt)
        .bind(&req.body)
        .bind(req.featured_media_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::reference_error)?;

        let post = Self::parse_post_row(&row)?;
        info!(
            subsystem = "db",
            component = "posts",
            op = "create",
            post_id = %post.id,
            user_id = %post.author_id,
            "Post created"
        );
        Ok(post)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_post_row).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM posts WHERE slug = $1 AND deleted_at IS NULL",
            POST_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_post_row).transpose()
    }

    async fn list(&self, req: ListPostsRequest) -> Result<Page<Post>> {
        let search = req
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM posts p
             WHERE ($1::text IS NULL OR p.status = $1)
               AND ($2::uuid IS NULL OR p.author_id = $2)
               AND ($3::uuid IS NULL OR p.organization_id = $3)
               AND ($4::text IS NULL OR EXISTS (
                   SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
                   WHERE pt.post_id = p.id AND t.slug = $4))
               AND ($5::uuid IS NULL OR EXISTS (
                   SELECT 1 FROM post_terms pm
                   WHERE pm.post_id = p.id AND pm.term_id = $5))
               AND ($6::text IS NULL OR p.title ILIKE $6)
               AND ($7::uuid IS NULL OR p.status = 'published' OR p.author_id = $7)
               AND (NOT $8 OR p.status = 'published')
               AND ($9 OR p.deleted_at IS NULL)
             ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC
             LIMIT $10 OFFSET $11",
            POST_COLUMNS
        ))
        .bind(req.status.map(|s| s.as_str()))
        .bind(req.author_id)
        .bind(req.organization_id)
        .bind(&req.tag_slug)
        .bind(req.term_id)
        .bind(search)
        .bind(req.visible_to)
        .bind(req.published_only)
        .bind(req.include_deleted)
        .bind(clamp_limit(req.limit))
        .bind(clamp_offset(req.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::page_from_rows(&rows)
    }

    async fn update(&self, id: Uuid, req: UpdatePostRequest) -> Result<Post> {
        let row = sqlx::query(&format!(
            "UPDATE posts SET
                title = COALESCE($2, title),
                slug = COALESCE($3, slug),
                excerpt = COALESCE($4, excerpt),
                body = COALESCE($5, body),
                organization_id = COALESCE($6, organization_id),
                featured_media_id = COALESCE($7, featured_media_id),
                updated_at = $8
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {}",
            POST_COLUMNS
        ))
        .bind(id)
        .bind(&req.title)
        .bind(&req.slug)
        .bind(&req.excerpt)
        .bind(&req.body)
        .bind(req.organization_id)
        .bind(req.featured_media_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::reference_error)?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_post_row(&row)
    }

    async fn set_status(&self, id: Uuid, status: PostStatus) -> Result<Post> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "UPDATE posts SET
                status = $2,
                published_at = CASE WHEN $2 = 'published'
                                    THEN COALESCE(published_at, $3)
                                    ELSE published_at END,
                updated_at = $3
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {}",
            POST_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        info!(
            subsystem = "db",
            component = "posts",
            op = "set_status",
            post_id = %id,
            status = status.as_str(),
            "Post status changed"
        );
        Self::parse_post_row(&row)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE posts SET deleted_at = $2, updated_at = $2
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if updated == 0 {
            return Err(Self::not_found(id));
        }
        info!(subsystem = "db", component = "posts", op = "soft_delete", post_id = %id, "Post deleted");
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<Post> {
        let row = sqlx::query(&format!(
            "UPDATE posts SET deleted_at = NULL, updated_at = $2
             WHERE id = $1
             RETURNING {}",
            POST_COLUMNS
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_post_row(&row)
    }

    async fn set_tags(&self, post_id: Uuid, tag_ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO post_tags (post_id, tag_id)
             SELECT $1, UNNEST($2::uuid[])
             ON CONFLICT DO NOTHING",
        )
        .bind(post_id)
        .bind(tag_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let err = Error::Database(e);
            if err.is_foreign_key_violation() {
                Error::NotFound("post or tag not found".to_string())
            } else {
                err
            }
        })?;

        tx.commit().await.map_err(Error::Database)?;
        debug!(subsystem = "db", component = "posts", post_id = %post_id, result_count = tag_ids.len(), "Post tags replaced");
        Ok(())
    }

    async fn tags(&self, post_id: Uuid) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT t.id, t.name, t.slug, t.created_at
             FROM post_tags pt
             JOIN tags t ON t.id = pt.tag_id
             WHERE pt.post_id = $1
             ORDER BY t.name",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(PgTagRepository::parse_tag_row).collect())
    }

    async fn search_fulltext(&self, query: &str, limit: i64, offset: i64) -> Result<Page<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM posts,
                    websearch_to_tsquery('english', $1) q
             WHERE status = 'published' AND deleted_at IS NULL
               AND search_vector @@ q
             ORDER BY ts_rank(search_vector, q) DESC, published_at DESC, id
             LIMIT $2 OFFSET $3",
            POST_COLUMNS
        ))
        .bind(query)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::page_from_rows(&rows)
    }

    async fn get_public_many(&self, ids: &[Uuid]) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts
             WHERE id = ANY($1) AND status = 'published' AND deleted_at IS NULL",
            POST_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_post_row).collect()
    }

    async fn list_public_after(&self, after: Option<Uuid>, limit: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts
             WHERE status = 'published' AND deleted_at IS NULL
               AND ($1::uuid IS NULL OR id > $1)
             ORDER BY id
             LIMIT $2",
            POST_COLUMNS
        ))
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_post_row).collect()
    }

    async fn clear_featured_media(&self, media_id: Uuid) -> Result<u64> {
        let cleared = sqlx::query(
            "UPDATE posts SET featured_media_id = NULL, updated_at = $2
             WHERE featured_media_id = $1",
        )
        .bind(media_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();
        Ok(cleared)
    }
}
