//! Queue inspection and failed-job recovery for administrators.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use plinth_core::{
    FailedJob, Job, JobRepository, JobStatus, JobType, Page, QueueStats, Result,
};
use plinth_db::Database;

use super::require;

#[derive(Clone)]
pub struct JobAdminService {
    db: Database,
}

impl JobAdminService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        status: Option<JobStatus>,
        job_type: Option<JobType>,
        limit: i64,
        offset: i64,
    ) -> Result<Page<Job>> {
        self.db.jobs.list(status, job_type, limit, offset).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.db.jobs.stats().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Job> {
        require(self.db.jobs.get(id).await?, "Job", id)
    }

    pub async fn list_failed(&self, limit: i64, offset: i64) -> Result<Page<FailedJob>> {
        self.db.jobs.list_failed(limit, offset).await
    }

    /// Requeue one failed job. Returns the new job id.
    pub async fn retry_failed(&self, id: Uuid) -> Result<Uuid> {
        let job_id = self.db.jobs.retry_failed(id).await?;
        info!(failed_id = %id, job_id = %job_id, "Failed job requeued");
        Ok(job_id)
    }

    pub async fn retry_all_failed(&self) -> Result<u64> {
        let count = self.db.jobs.retry_all_failed().await?;
        info!(count, "Failed jobs requeued");
        Ok(count)
    }

    pub async fn forget_failed(&self, id: Uuid) -> Result<()> {
        if !self.db.jobs.forget_failed(id).await? {
            return Err(plinth_core::Error::NotFound(format!("Failed job {} not found", id)));
        }
        Ok(())
    }

    pub async fn flush_failed(&self) -> Result<u64> {
        self.db.jobs.flush_failed().await
    }

    /// Queue a full search reindex unless one is already pending.
    pub async fn queue_reindex(&self) -> Result<Option<Uuid>> {
        self.db
            .jobs
            .queue_deduplicated(
                JobType::SearchReindex,
                json!({}),
                JobType::SearchReindex.default_priority(),
            )
            .await
    }
}
