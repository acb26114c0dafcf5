//! Job queue repository implementation.
//!
//! Jobs live in `job_queue` until they complete or run out of attempts.
//! Exhausted jobs are moved, in the same transaction, into `failed_jobs`
//! where they wait for an operator to retry or forget them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use plinth_core::defaults::JOB_MAX_ATTEMPTS;
use plinth_core::{
    new_v7, Error, FailedJob, Job, JobRepository, JobStatus, JobType, Page, QueueStats, Result,
};

use crate::get_enum;

const JOB_COLUMNS: &str = "id, job_type, status, priority, payload, result, error_message, \
                           attempts, max_attempts, created_at, started_at, completed_at";

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Wakes idle workers as soon as a job is queued.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Handle that is notified whenever a job is queued.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn parse_job_row(row: &PgRow) -> Result<Job> {
        Ok(Job {
            id: row.get("id"),
            job_type: get_enum(row, "job_type")?,
            status: get_enum(row, "status")?,
            priority: row.get("priority"),
            payload: row.get("payload"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }

    fn parse_failed_row(row: &PgRow) -> Result<FailedJob> {
        Ok(FailedJob {
            id: row.get("id"),
            job_id: row.get("job_id"),
            job_type: get_enum(row, "job_type")?,
            priority: row.get("priority"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            attempts: row.get("attempts"),
            failed_at: row.get("failed_at"),
        })
    }

    /// Move a job row into `failed_jobs` inside an open transaction.
    async fn park(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        job_id: Uuid,
        error: &str,
    ) -> Result<()> {
        let moved = sqlx::query(
            "WITH gone AS (DELETE FROM job_queue WHERE id = $1
                           RETURNING id, job_type, priority, payload, attempts)
             INSERT INTO failed_jobs (id, job_id, job_type, priority, payload, error_message, attempts, failed_at)
             SELECT $2, id, job_type, priority, payload, $3, attempts, $4 FROM gone",
        )
        .bind(job_id)
        .bind(new_v7())
        .bind(error)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        if moved.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Job {} not found", job_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        job_type: JobType,
        payload: JsonValue,
        priority: i32,
        max_attempts: i32,
    ) -> Result<Uuid> {
        let id = new_v7();

        sqlx::query(
            "INSERT INTO job_queue (id, job_type, status, priority, payload, max_attempts, created_at)
             VALUES ($1, $2, 'pending', $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(job_type.as_str())
        .bind(priority)
        .bind(&payload)
        .bind(max_attempts.max(1))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "jobs",
            component = "queue",
            op = "queue",
            job_id = %id,
            job_type = job_type.as_str(),
            priority,
            "Job queued"
        );
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn queue_deduplicated(
        &self,
        job_type: JobType,
        payload: JsonValue,
        priority: i32,
    ) -> Result<Option<Uuid>> {
        let id = new_v7();

        let inserted: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO job_queue (id, job_type, status, priority, payload, max_attempts, created_at)
             SELECT $1, $2, 'pending', $3, $4, $5, $6
             WHERE NOT EXISTS (
                 SELECT 1 FROM job_queue
                 WHERE job_type = $2 AND payload = $4 AND status = 'pending'
             )
             RETURNING id",
        )
        .bind(id)
        .bind(job_type.as_str())
        .bind(priority)
        .bind(&payload)
        .bind(JOB_MAX_ATTEMPTS)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if inserted.is_some() {
            self.notify.notify_waiters();
        } else {
            debug!(
                subsystem = "jobs",
                job_type = job_type.as_str(),
                "Identical job already pending, skipped"
            );
        }
        Ok(inserted)
    }

    async fn claim_next(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let types: Vec<&str> = job_types.iter().map(|t| t.as_str()).collect();

        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET status = 'running', started_at = $1, attempts = attempts + 1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'
                   AND (cardinality($2::text[]) = 0 OR job_type = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(Utc::now())
        .bind(&types)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        let done = sqlx::query(
            "UPDATE job_queue
             SET status = 'completed', completed_at = $1, result = $2, error_message = NULL
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if done.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Job {} not found", job_id)));
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<JobStatus> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (attempts, max_attempts): (i32, i32) = sqlx::query_as(
            "SELECT attempts, max_attempts FROM job_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("Job {} not found", job_id)))?;

        let status = if attempts < max_attempts {
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending', error_message = $1, started_at = NULL
                 WHERE id = $2",
            )
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            JobStatus::Pending
        } else {
            Self::park(&mut tx, job_id, error).await?;
            JobStatus::Failed
        };

        tx.commit().await.map_err(Error::Database)?;

        if status == JobStatus::Failed {
            warn!(
                subsystem = "jobs",
                job_id = %job_id,
                attempts,
                error,
                "Job exhausted its attempts and was moved to failed jobs"
            );
        }
        Ok(status)
    }

    async fn fail_permanently(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::park(&mut tx, job_id, error).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {} FROM job_queue WHERE id = $1", JOB_COLUMNS))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn list(
        &self,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Job>> {
        let status = status.map(|s| s.as_str());
        let job_type = job_type.map(|t| t.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {}, COUNT(*) OVER () AS total_count FROM job_queue
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR job_type = $2)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4",
            JOB_COLUMNS
        ))
        .bind(status)
        .bind(job_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let jobs = rows
            .iter()
            .map(Self::parse_job_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(jobs, total))
    }

    async fn stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                COUNT(*) FILTER (WHERE status = 'completed'
                                 AND completed_at > now() - interval '1 hour') AS completed_last_hour,
                (SELECT COUNT(*) FROM failed_jobs) AS failed,
                COUNT(*) AS total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get("pending"),
            running: row.get("running"),
            completed_last_hour: row.get("completed_last_hour"),
            failed: row.get("failed"),
            total: row.get("total"),
        })
    }

    async fn pending_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn reset_stale(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let reset = sqlx::query(
            "UPDATE job_queue SET status = 'pending', started_at = NULL
             WHERE status = 'running' AND started_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if reset > 0 {
            warn!(
                subsystem = "jobs",
                op = "reset_stale",
                count = reset,
                "Reset abandoned running jobs to pending"
            );
            self.notify.notify_waiters();
        }
        Ok(reset)
    }

    async fn cleanup_completed(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM job_queue WHERE status = 'completed' AND completed_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        info!(subsystem = "jobs", op = "cleanup", deleted, "Completed jobs cleaned up");
        Ok(deleted)
    }

    async fn list_failed(&self, limit: i64, offset: i64) -> Result<Page<FailedJob>> {
        let rows = sqlx::query(
            "SELECT id, job_id, job_type, priority, payload, error_message, attempts, failed_at,
                    COUNT(*) OVER () AS total_count
             FROM failed_jobs
             ORDER BY failed_at DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let total = rows.first().map(|r| r.get("total_count")).unwrap_or(0);
        let failed = rows
            .iter()
            .map(Self::parse_failed_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(failed, total))
    }

    async fn retry_failed(&self, failed_id: Uuid) -> Result<Uuid> {
        let new_id = new_v7();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let requeued: Option<Uuid> = sqlx::query_scalar(
            "WITH gone AS (DELETE FROM failed_jobs WHERE id = $1 RETURNING job_type, priority, payload)
             INSERT INTO job_queue (id, job_type, status, priority, payload, max_attempts, created_at)
             SELECT $2, job_type, 'pending', priority, payload, $3, $4 FROM gone
             RETURNING id",
        )
        .bind(failed_id)
        .bind(new_id)
        .bind(JOB_MAX_ATTEMPTS)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        let id = requeued
            .ok_or_else(|| Error::NotFound(format!("Failed job {} not found", failed_id)))?;
        info!(subsystem = "jobs", op = "retry_failed", failed_id = %failed_id, job_id = %id, "Failed job requeued");
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn retry_all_failed(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let rows = sqlx::query("DELETE FROM failed_jobs RETURNING job_type, priority, payload")
            .fetch_all(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let now = Utc::now();
        for row in &rows {
            sqlx::query(
                "INSERT INTO job_queue (id, job_type, status, priority, payload, max_attempts, created_at)
                 VALUES ($1, $2, 'pending', $3, $4, $5, $6)",
            )
            .bind(new_v7())
            .bind(row.get::<String, _>("job_type"))
            .bind(row.get::<i32, _>("priority"))
            .bind(row.get::<JsonValue, _>("payload"))
            .bind(JOB_MAX_ATTEMPTS)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        let count = rows.len() as u64;
        if count > 0 {
            info!(subsystem = "jobs", op = "retry_all_failed", count, "Failed jobs requeued");
            self.notify.notify_waiters();
        }
        Ok(count)
    }

    async fn forget_failed(&self, failed_id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM failed_jobs WHERE id = $1")
            .bind(failed_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn flush_failed(&self) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM failed_jobs")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        info!(subsystem = "jobs", op = "flush_failed", deleted, "Failed jobs flushed");
        Ok(deleted)
    }
}
