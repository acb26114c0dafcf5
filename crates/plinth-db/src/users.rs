//! User repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use plinth_core::validation::{clamp_limit, clamp_offset};
use plinth_core::{
    new_v7, CreateUserRequest, Error, ListUsersRequest, Page, Result, UpdateUserRequest, User,
    UserCredentials, UserRepository,
};

use crate::{escape_like, get_enum};

const USER_COLUMNS: &str =
    "id, email, display_name, role, is_active, email_verified_at, created_at, updated_at, deleted_at";

/// PostgreSQL implementation of UserRepository.
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub(crate) fn parse_user_row(row: &PgRow) -> Result<User> {
        Ok(User {
            id: row.get("id"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            role: get_enum(row, "role")?,
            is_active: row.get("is_active"),
            email_verified_at: row.get("email_verified_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }

    fn parse_credentials_row(row: &PgRow) -> Result<UserCredentials> {
        Ok(UserCredentials {
            user: Self::parse_user_row(row)?,
            password_hash: row.get("password_hash"),
        })
    }

    fn not_found(id: Uuid) -> Error {
        Error::NotFound(format!("User {} not found", id))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, req: CreateUserRequest) -> Result<User> {
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO users (id, email, display_name, password_hash, role, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(new_v7())
        .bind(&req.email)
        .bind(&req.display_name)
        .bind(&req.password_hash)
        .bind(req.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(e).on_unique_violation("email is already registered"))?;

        let user = Self::parse_user_row(&row)?;
        info!(
            subsystem = "db",
            component = "users",
            op = "create",
            user_id = %user.id,
            role = user.role.as_str(),
            "User created"
        );
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_user_row).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE email = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_user_row).transpose()
    }

    async fn get_credentials(&self, email: &str) -> Result<Option<UserCredentials>> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash FROM users WHERE email = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_credentials_row).transpose()
    }

    async fn get_credentials_by_id(&self, id: Uuid) -> Result<Option<UserCredentials>> {
        let row = sqlx::query(&format!(
            "SELECT {}, password_hash FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_credentials_row).transpose()
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND deleted_at IS NULL)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn list(&self, req: ListUsersRequest) -> Result<Page<User>> {
        let pattern = req
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM users
             WHERE deleted_at IS NULL
               AND ($1::text IS NULL OR role = $1)
               AND ($2::bool IS NULL OR is_active = $2)
               AND ($3::text IS NULL OR email ILIKE $3 OR display_name ILIKE $3)
             ORDER BY created_at DESC, id
             LIMIT $4 OFFSET $5",
            USER_COLUMNS
        ))
        .bind(req.role.map(|r| r.as_str()))
        .bind(req.is_active)
        .bind(pattern)
        .bind(clamp_limit(req.limit))
        .bind(clamp_offset(req.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let users = rows
            .iter()
            .map(Self::parse_user_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(users, total))
    }

    async fn update(&self, id: Uuid, req: UpdateUserRequest) -> Result<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET
                display_name = COALESCE($2, display_name),
                role = COALESCE($3, role),
                is_active = COALESCE($4, is_active),
                updated_at = $5
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(req.display_name)
        .bind(req.role.map(|r| r.as_str()))
        .bind(req.is_active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Self::not_found(id))?;

        Self::parse_user_row(&row)
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE users SET email_verified_at = COALESCE(email_verified_at, $2), updated_at = $2
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let now = Utc::now();

        let updated = sqlx::query(
            "UPDATE users SET deleted_at = $2, is_active = FALSE, updated_at = $2
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }

        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        info!(subsystem = "db", component = "users", op = "soft_delete", user_id = %id, "User deleted");
        Ok(())
    }
}
