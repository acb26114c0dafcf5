//! Taxonomy repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use plinth_core::{
    new_v7, CreateTaxonomyRequest, Error, Page, Result, Taxonomy, TaxonomyRepository,
    UpdateTaxonomyRequest,
};

const TAXONOMY_COLUMNS: &str = "id, name, slug, description, hierarchical, created_at, updated_at";

/// PostgreSQL implementation of TaxonomyRepository.
pub struct PgTaxonomyRepository {
    pool: Pool<Postgres>,
}

impl PgTaxonomyRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_taxonomy_row(row: &PgRow) -> Taxonomy {
        Taxonomy {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            description: row.get("description"),
            hierarchical: row.get("hierarchical"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl TaxonomyRepository for PgTaxonomyRepository {
    async fn create(&self, req: CreateTaxonomyRequest) -> Result<Taxonomy> {
        let row = sqlx::query(&format!(
            "INSERT INTO taxonomies (id, name, slug, description, hierarchical, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {}",
            TAXONOMY_COLUMNS
        ))
        .bind(new_v7())
        .bind(&req.name)
        .bind(&req.slug)
        .bind(&req.description)
        .bind(req.hierarchical)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(e).on_unique_violation(format!("slug '{}' is already taken", req.slug))
        })?;

        Ok(Self::parse_taxonomy_row(&row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Taxonomy>> {
        let row = sqlx::query(&format!("SELECT {} FROM taxonomies WHERE id = $1", TAXONOMY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_taxonomy_row))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Taxonomy>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM taxonomies WHERE slug = $1",
            TAXONOMY_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_taxonomy_row))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Page<Taxonomy>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM taxonomies
             ORDER BY name, id
             LIMIT $1 OFFSET $2",
            TAXONOMY_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        Ok(Page::new(
            rows.iter().map(Self::parse_taxonomy_row).collect(),
            total,
        ))
    }

    async fn update(&self, id: Uuid, req: UpdateTaxonomyRequest) -> Result<Taxonomy> {
        let row = sqlx::query(&format!(
            "UPDATE taxonomies SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                updated_at = $5
             WHERE id = $1
             RETURNING {}",
            TAXONOMY_COLUMNS
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&req.slug)
        .bind(&req.description)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e).on_unique_violation("slug is already taken"))?
        .ok_or_else(|| Error::NotFound(format!("Taxonomy {} not found", id)))?;

        Ok(Self::parse_taxonomy_row(&row))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        // Terms, their post assignments and menu links cascade.
        let deleted = sqlx::query("DELETE FROM taxonomies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound(format!("Taxonomy {} not found", id)));
        }
        info!(subsystem = "db", component = "taxonomies", op = "delete", taxonomy_id = %id, "Taxonomy deleted");
        Ok(())
    }
}
