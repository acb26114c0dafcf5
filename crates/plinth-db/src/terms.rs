//! Term repository implementation.
//!
//! Terms form one forest per taxonomy. Post assignments live in
//! `post_terms`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use plinth_core::{
    new_v7, CreateTermRequest, Error, Page, Result, Term, TermRepository, TreeEntry,
    TreeRepository, UpdateTermRequest,
};

use crate::tree::TreeTable;

const TREE: TreeTable = TreeTable {
    table: "terms",
    scope: Some("taxonomy_id"),
    order_by: "name",
};

const TERM_COLUMNS: &str =
    "id, taxonomy_id, name, slug, description, parent_id, created_at, updated_at";

/// PostgreSQL implementation of TermRepository.
pub struct PgTermRepository {
    pool: Pool<Postgres>,
}

impl PgTermRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_term_row(row: &PgRow) -> Result<Term> {
        Ok(Term {
            id: row.get("id"),
            taxonomy_id: row.get("taxonomy_id"),
            name: row.get("name"),
            slug: row.get("slug"),
            description: row.get("description"),
            parent_id: row.get("parent_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("Term {} not found", id))
    }
}

#[async_trait]
impl TreeRepository for PgTermRepository {
    fn node_kind(&self) -> &'static str {
        "term"
    }

    async fn node_exists(&self, id: Uuid) -> Result<bool> {
        TREE.exists(&self.pool, id).await
    }

    async fn is_descendant(&self, ancestor: Uuid, candidate: Uuid) -> Result<bool> {
        TREE.is_descendant(&self.pool, ancestor, candidate).await
    }
}

#[async_trait]
impl TermRepository for PgTermRepository {
    async fn create(&self, req: CreateTermRequest) -> Result<Term> {
        let row = sqlx::query(&format!(
            "INSERT INTO terms (id, taxonomy_id, name, slug, description, parent_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {}",
            TERM_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.taxonomy_id)
        .bind(&req.name)
        .bind(&req.slug)
        .bind(&req.description)
        .bind(req.parent_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(e).on_unique_violation(format!(
                "slug '{}' is already used in this taxonomy",
                req.slug
            ))
        })?;

        Self::parse_term_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Term>> {
        let row = sqlx::query(&format!("SELECT {} FROM terms WHERE id = $1", TERM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_term_row).transpose()
    }

    async fn list(
        &self,
        taxonomy_id: Uuid,
        parent_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Term>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM terms
             WHERE taxonomy_id = $1 AND parent_id IS NOT DISTINCT FROM $2
             ORDER BY name, id
             LIMIT $3 OFFSET $4",
            TERM_COLUMNS
        ))
        .bind(taxonomy_id)
        .bind(parent_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let terms = rows
            .iter()
            .map(Self::parse_term_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(terms, total))
    }

    async fn update(&self, id: Uuid, req: UpdateTermRequest) -> Result<Term> {
        let row = sqlx::query(&format!(
            "UPDATE terms SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                updated_at = $5
             WHERE id = $1
             RETURNING {}",
            TERM_COLUMNS
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&req.slug)
        .bind(&req.description)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(e).on_unique_violation("slug is already used in this taxonomy")
        })?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_term_row(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        if TREE.has_children(&self.pool, id).await? {
            return Err(Error::Conflict(
                "term has child terms; move or delete them first".to_string(),
            ));
        }

        let deleted = sqlx::query("DELETE FROM terms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let err = Error::Database(e);
                if err.is_foreign_key_violation() {
                    Error::Conflict("term gained children while deleting".to_string())
                } else {
                    err
                }
            })?
            .rows_affected();

        if deleted == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn children(&self, id: Uuid) -> Result<Vec<Term>> {
        TREE.children(&self.pool, id, Self::parse_term_row).await
    }

    async fn siblings(&self, id: Uuid) -> Result<Vec<Term>> {
        TREE.siblings(&self.pool, id, Self::parse_term_row).await
    }

    async fn ancestors(&self, id: Uuid) -> Result<Vec<TreeEntry<Term>>> {
        TREE.ancestors(&self.pool, id, Self::parse_term_row).await
    }

    async fn descendants(&self, id: Uuid, max_depth: i32) -> Result<Vec<TreeEntry<Term>>> {
        TREE.descendants(&self.pool, id, max_depth, Self::parse_term_row)
            .await
    }

    async fn set_parent(&self, id: Uuid, parent_id: Option<Uuid>) -> Result<Term> {
        let row = sqlx::query(&format!(
            "UPDATE terms SET parent_id = $2, updated_at = $3
             WHERE id = $1
             RETURNING {}",
            TERM_COLUMNS
        ))
        .bind(id)
        .bind(parent_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        info!(
            subsystem = "db",
            component = "terms",
            op = "move",
            node_id = %id,
            parent_id = ?parent_id,
            "Term moved"
        );
        Self::parse_term_row(&row)
    }

    async fn set_post_terms(
        &self,
        post_id: Uuid,
        taxonomy_id: Uuid,
        term_ids: &[Uuid],
    ) -> Result<()> {
        let mut ids = term_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let matching: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM terms WHERE taxonomy_id = $1 AND id = ANY($2)",
        )
        .bind(taxonomy_id)
        .bind(&ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if matching != ids.len() as i64 {
            return Err(Error::InvalidInput(
                "every term must exist and belong to the taxonomy".to_string(),
            ));
        }

        sqlx::query(
            "DELETE FROM post_terms pt USING terms t
             WHERE pt.term_id = t.id AND pt.post_id = $1 AND t.taxonomy_id = $2",
        )
        .bind(post_id)
        .bind(taxonomy_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO post_terms (post_id, term_id)
             SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(post_id)
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let err = Error::Database(e);
            if err.is_foreign_key_violation() {
                Error::NotFound(format!("Post {} not found", post_id))
            } else {
                err
            }
        })?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "terms",
            post_id = %post_id,
            taxonomy_id = %taxonomy_id,
            result_count = ids.len(),
            "Post terms replaced"
        );
        Ok(())
    }

    async fn post_terms(&self, post_id: Uuid) -> Result<Vec<Term>> {
        let rows = sqlx::query(
            "SELECT t.id, t.taxonomy_id, t.name, t.slug, t.description, t.parent_id,
                    t.created_at, t.updated_at
             FROM post_terms pt
             JOIN terms t ON t.id = pt.term_id
             WHERE pt.post_id = $1
             ORDER BY t.taxonomy_id, t.name",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_term_row).collect()
    }
}
