//! Job handlers for each job type.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use plinth_core::{Error, Job, JobType, Result};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// Get the raw job payload.
    pub fn payload(&self) -> &JsonValue {
        &self.job.payload
    }

    /// Decode the payload into a typed struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.job.payload.clone()).map_err(|e| {
            Error::InvalidInput(format!(
                "invalid {} payload: {}",
                self.job.job_type, e
            ))
        })
    }

    /// Whether this run is the last one the queue will make.
    pub fn is_last_attempt(&self) -> bool {
        !self.job.has_attempts_left()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed and must not be retried.
    Failed(String),
    /// Job failed transiently; the queue retries it while attempts remain.
    Retry(String),
}

impl JobResult {
    /// Map a handler error: bad input never succeeds on retry, everything
    /// else might.
    pub fn from_error(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) | Error::NotFound(msg) => JobResult::Failed(msg),
            other => JobResult::Retry(other.to_string()),
        }
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use uuid::Uuid;

    fn job(job_type: JobType, payload: JsonValue) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type,
            status: plinth_core::JobStatus::Running,
            priority: 0,
            payload,
            result: None,
            error_message: None,
            attempts: 1,
            max_attempts: 3,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
        }
    }

    #[derive(Deserialize)]
    struct Cleanup {
        path: String,
    }

    #[test]
    fn test_payload_as_decodes() {
        let ctx = JobContext::new(job(JobType::MediaCleanup, json!({"path": "blobs/a.bin"})));
        let payload: Cleanup = ctx.payload_as().unwrap();
        assert_eq!(payload.path, "blobs/a.bin");
    }

    #[test]
    fn test_payload_as_rejects_wrong_shape() {
        let ctx = JobContext::new(job(JobType::MediaCleanup, json!({"file": 3})));
        let err = ctx.payload_as::<Cleanup>().err().unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("media_cleanup"));
    }

    #[test]
    fn test_last_attempt() {
        let mut j = job(JobType::SendEmail, json!({}));
        assert!(!JobContext::new(j.clone()).is_last_attempt());
        j.attempts = 3;
        assert!(JobContext::new(j).is_last_attempt());
    }

    #[test]
    fn test_from_error_classifies() {
        assert!(matches!(
            JobResult::from_error(Error::InvalidInput("bad".into())),
            JobResult::Failed(_)
        ));
        assert!(matches!(
            JobResult::from_error(Error::Search("down".into())),
            JobResult::Retry(_)
        ));
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(JobType::SearchReindex);
        assert!(handler.can_handle(JobType::SearchReindex));
        assert!(!handler.can_handle(JobType::SendEmail));

        let result = handler
            .execute(JobContext::new(job(JobType::SearchReindex, json!({}))))
            .await;
        assert!(matches!(result, JobResult::Success(None)));
    }
}
