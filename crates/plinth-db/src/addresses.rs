//! Address repository implementation.
//!
//! Each owner keeps at most one primary address, enforced by a partial
//! unique index. Every primary switch runs in a transaction that clears the
//! old flag before setting the new one.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use plinth_core::{
    new_v7, Address, AddressRepository, CreateAddressRequest, Error, OwnerType, Result,
    UpdateAddressRequest,
};

use crate::get_enum;

const ADDRESS_COLUMNS: &str = "id, owner_type, owner_id, label, line1, line2, city, region, \
                               postal_code, country_code, is_primary, created_at, updated_at";

/// PostgreSQL implementation of AddressRepository.
pub struct PgAddressRepository {
    pool: Pool<Postgres>,
}

impl PgAddressRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_address_row(row: &PgRow) -> Result<Address> {
        Ok(Address {
            id: row.get("id"),
            owner_type: get_enum(row, "owner_type")?,
            owner_id: row.get("owner_id"),
            label: row.get("label"),
            line1: row.get("line1"),
            line2: row.get("line2"),
            city: row.get("city"),
            region: row.get("region"),
            postal_code: row.get("postal_code"),
            country_code: row.get("country_code"),
            is_primary: row.get("is_primary"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("Address {} not found", id))
    }
}

#[async_trait]
impl AddressRepository for PgAddressRepository {
    async fn create(&self, req: CreateAddressRequest) -> Result<Address> {
        let row = sqlx::query(&format!(
            "INSERT INTO addresses (id, owner_type, owner_id, label, line1, line2, city, region,
                                    postal_code, country_code, is_primary, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                     NOT EXISTS (SELECT 1 FROM addresses WHERE owner_type = $2 AND owner_id = $3),
                     $11, $11)
             RETURNING {}",
            ADDRESS_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.owner_type.as_str())
        .bind(req.owner_id)
        .bind(&req.label)
        .bind(&req.line1)
        .bind(&req.line2)
        .bind(&req.city)
        .bind(&req.region)
        .bind(&req.postal_code)
        .bind(&req.country_code)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(e).on_unique_violation("owner gained a primary address concurrently")
        })?;

        Self::parse_address_row(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Address>> {
        let row = sqlx::query(&format!("SELECT {} FROM addresses WHERE id = $1", ADDRESS_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_address_row).transpose()
    }

    async fn list_for_owner(&self, owner_type: OwnerType, owner_id: Uuid) -> Result<Vec<Address>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM addresses
             WHERE owner_type = $1 AND owner_id = $2
             ORDER BY is_primary DESC, created_at, id",
            ADDRESS_COLUMNS
        ))
        .bind(owner_type.as_str())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_address_row).collect()
    }

    async fn update(&self, id: Uuid, req: UpdateAddressRequest) -> Result<Address> {
        // Only the supplied columns are written; a `Some(None)` binds NULL.
        let changes: Vec<(&str, Option<String>)> = [
            ("label", req.label),
            ("line1", req.line1.map(Some)),
            ("line2", req.line2),
            ("city", req.city.map(Some)),
            ("region", req.region),
            ("postal_code", req.postal_code),
            ("country_code", req.country_code.map(Some)),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
        .collect();

        let mut updates = vec!["updated_at = $2".to_string()];
        for (i, (column, _)) in changes.iter().enumerate() {
            updates.push(format!("{} = ${}", column, i + 3));
        }

        let query = format!(
            "UPDATE addresses SET {} WHERE id = $1 RETURNING {}",
            updates.join(", "),
            ADDRESS_COLUMNS
        );
        let mut q = sqlx::query(&query).bind(id).bind(Utc::now());
        for (_, value) in changes {
            q = q.bind(value);
        }

        let row = q
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Self::not_found(id))?;

        Self::parse_address_row(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let removed: Option<(String, Uuid, bool)> = sqlx::query_as(
            "DELETE FROM addresses WHERE id = $1 RETURNING owner_type, owner_id, is_primary",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some((owner_type, owner_id, was_primary)) = removed else {
            return Err(Self::not_found(id));
        };

        if was_primary {
            sqlx::query(
                "UPDATE addresses SET is_primary = TRUE, updated_at = $3
                 WHERE id = (
                     SELECT id FROM addresses
                     WHERE owner_type = $1 AND owner_id = $2
                     ORDER BY created_at, id
                     LIMIT 1
                 )",
            )
            .bind(&owner_type)
            .bind(owner_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        debug!(subsystem = "db", component = "addresses", op = "delete", address_id = %id, was_primary, "Address deleted");
        Ok(())
    }

    async fn set_primary(&self, id: Uuid) -> Result<Address> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let now = Utc::now();

        let owner: Option<(String, Uuid)> = sqlx::query_as(
            "SELECT owner_type, owner_id FROM addresses WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some((owner_type, owner_id)) = owner else {
            return Err(Self::not_found(id));
        };

        sqlx::query(
            "UPDATE addresses SET is_primary = FALSE, updated_at = $3
             WHERE owner_type = $1 AND owner_id = $2 AND is_primary AND id <> $4",
        )
        .bind(&owner_type)
        .bind(owner_id)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "UPDATE addresses SET is_primary = TRUE, updated_at = $2 WHERE id = $1 RETURNING {}",
            ADDRESS_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        Self::parse_address_row(&row)
    }
}
