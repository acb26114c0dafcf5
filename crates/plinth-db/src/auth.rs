//! Session and account-token storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use plinth_core::{new_v7, AccountTokenKind, AuthRepository, Error, Result, Session, User};

use crate::users::PgUserRepository;

/// PostgreSQL implementation of AuthRepository.
pub struct PgAuthRepository {
    pool: Pool<Postgres>,
}

impl PgAuthRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_session_row(row: &PgRow) -> Session {
        Session {
            id: row.get("session_id"),
            user_id: row.get("session_user_id"),
            created_at: row.get("session_created_at"),
            expires_at: row.get("expires_at"),
            last_used_at: row.get("last_used_at"),
        }
    }
}

#[async_trait]
impl AuthRepository for PgAuthRepository {
    async fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session = Session {
            id: new_v7(),
            user_id,
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(user_id)
        .bind(token_hash)
        .bind(session.created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(session)
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<(Session, User)>> {
        let row = sqlx::query(
            "WITH touched AS (
                 UPDATE sessions SET last_used_at = $2
                 WHERE token_hash = $1 AND expires_at > $2
                 RETURNING id, user_id, created_at, expires_at, last_used_at
             )
             SELECT s.id AS session_id, s.user_id AS session_user_id,
                    s.created_at AS session_created_at, s.expires_at, s.last_used_at,
                    u.id, u.email, u.display_name, u.role, u.is_active,
                    u.email_verified_at, u.created_at, u.updated_at, u.deleted_at
             FROM touched s
             JOIN users u ON u.id = s.user_id
             WHERE u.deleted_at IS NULL AND u.is_active",
        )
        .bind(token_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => {
                let user = PgUserRepository::parse_user_row(&row)?;
                Ok(Some((Self::parse_session_row(&row), user)))
            }
            None => Ok(None),
        }
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn delete_user_sessions(&self, user_id: Uuid, keep: Option<Uuid>) -> Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM sessions WHERE user_id = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(user_id)
        .bind(keep)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        debug!(subsystem = "auth", user_id = %user_id, revoked = deleted, "Sessions revoked");
        Ok(deleted)
    }

    async fn purge_expired_sessions(&self) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        Ok(deleted)
    }

    async fn create_account_token(
        &self,
        user_id: Uuid,
        kind: AccountTokenKind,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO account_tokens (id, user_id, kind, token_hash, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, kind) DO UPDATE
             SET id = EXCLUDED.id, token_hash = EXCLUDED.token_hash,
                 expires_at = EXCLUDED.expires_at, created_at = EXCLUDED.created_at",
        )
        .bind(new_v7())
        .bind(user_id)
        .bind(kind.as_str())
        .bind(token_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn consume_account_token(
        &self,
        kind: AccountTokenKind,
        token_hash: &str,
    ) -> Result<Option<Uuid>> {
        // Expired tokens are removed too, but never honoured.
        let row: Option<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            "DELETE FROM account_tokens WHERE kind = $1 AND token_hash = $2
             RETURNING user_id, expires_at",
        )
        .bind(kind.as_str())
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(user_id, _)| user_id))
    }
}
