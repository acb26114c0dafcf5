use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults::{JOB_PRIORITY, JOB_PRIORITY_HIGH};

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

string_enum!(JobStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

/// Type of background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Deliver one email through the configured mailer
    SendEmail,
    /// Push a post into the search index (or drop it if no longer public)
    SearchIndex,
    /// Remove a post from the search index
    SearchRemove,
    /// Clear the index and push every public post
    SearchReindex,
    /// Delete a media blob from object storage
    MediaCleanup,
}

string_enum!(JobType {
    SendEmail => "send_email",
    SearchIndex => "search_index",
    SearchRemove => "search_remove",
    SearchReindex => "search_reindex",
    MediaCleanup => "media_cleanup",
});

impl JobType {
    /// Default priority for this job type (higher = more urgent)
    pub fn default_priority(&self) -> i32 {
        match self {
            // Someone is waiting on their inbox
            JobType::SendEmail => JOB_PRIORITY_HIGH,
            JobType::SearchIndex | JobType::SearchRemove => JOB_PRIORITY + 5,
            JobType::MediaCleanup => JOB_PRIORITY + 1,
            JobType::SearchReindex => JOB_PRIORITY,
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: JsonValue,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    /// Attempts started so far, including the current one while running.
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether another failure would still be retried.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// A job that exhausted its attempts, parked for manual recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_type: JobType,
    /// Priority the job had when it was parked; restored on retry.
    pub priority: i32,
    pub payload: JsonValue,
    pub error_message: String,
    pub attempts: i32,
    pub failed_at: DateTime<Utc>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed_last_hour: i64,
    pub failed: i64,
    pub total: i64,
}
