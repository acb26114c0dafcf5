//! Worker dispatch against a real queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use plinth_db::test_fixtures::TestDatabase;
use plinth_jobs::{
    JobContext, JobHandler, JobRepository, JobResult, JobStatus, JobType, NoOpHandler,
    WorkerBuilder, WorkerConfig, WorkerEvent,
};

/// Fails with the given result a fixed number of times, then succeeds.
struct Flaky {
    failures: usize,
    calls: Arc<AtomicUsize>,
    retry: bool,
}

#[async_trait]
impl JobHandler for Flaky {
    fn job_type(&self) -> JobType {
        JobType::SendEmail
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            if self.retry {
                JobResult::Retry("relay unavailable".to_string())
            } else {
                JobResult::Failed("malformed address".to_string())
            }
        } else {
            JobResult::Success(Some(json!({"delivered": true})))
        }
    }
}

struct Sleepy;

#[async_trait]
impl JobHandler for Sleepy {
    fn job_type(&self) -> JobType {
        JobType::SearchReindex
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        tokio::time::sleep(Duration::from_secs(5)).await;
        JobResult::Success(None)
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn retry_result_requeues_until_success() {
    let test_db = TestDatabase::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let worker = WorkerBuilder::new(test_db.db.clone())
        .with_handler(Flaky {
            failures: 1,
            calls: calls.clone(),
            retry: true,
        })
        .build()
        .await;

    let id = test_db
        .db
        .jobs
        .queue(JobType::SendEmail, json!({"to": "a@example.com"}), 10, 3)
        .await
        .unwrap();

    assert_eq!(worker.run_batch().await, 1);
    assert_eq!(
        test_db.db.jobs.get(id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    assert_eq!(worker.run_batch().await, 1);
    let job = test_db.db.jobs.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn failed_result_parks_without_retry() {
    let test_db = TestDatabase::new().await;
    let worker = WorkerBuilder::new(test_db.db.clone())
        .with_handler(Flaky {
            failures: 10,
            calls: Arc::new(AtomicUsize::new(0)),
            retry: false,
        })
        .build()
        .await;

    let id = test_db
        .db
        .jobs
        .queue(JobType::SendEmail, json!({"to": "nope"}), 10, 3)
        .await
        .unwrap();
    worker.run_batch().await;

    assert!(test_db.db.jobs.get(id).await.unwrap().is_none());
    let failed = test_db.db.jobs.list_failed(10, 0).await.unwrap();
    assert_eq!(failed.items[0].job_id, id);
    assert_eq!(failed.items[0].attempts, 1);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn unhandled_job_type_fails_immediately() {
    let test_db = TestDatabase::new().await;
    let worker = WorkerBuilder::new(test_db.db.clone())
        .with_handler(NoOpHandler::new(JobType::SearchIndex))
        .build()
        .await;

    test_db
        .db
        .jobs
        .queue(JobType::MediaCleanup, json!({"path": "x"}), 1, 3)
        .await
        .unwrap();
    worker.run_batch().await;

    let failed = test_db.db.jobs.list_failed(10, 0).await.unwrap();
    assert_eq!(failed.total, 1);
    assert!(failed.items[0].error_message.contains("media_cleanup"));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn timeout_counts_as_retryable_failure() {
    let test_db = TestDatabase::new().await;
    let worker = WorkerBuilder::new(test_db.db.clone())
        .with_config(WorkerConfig::default().with_job_timeout(1))
        .with_handler(Sleepy)
        .build()
        .await;

    let id = test_db
        .db
        .jobs
        .queue(JobType::SearchReindex, json!({}), 0, 2)
        .await
        .unwrap();
    worker.run_batch().await;

    let job = test_db.db.jobs.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.error_message.unwrap().contains("timeout"));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn started_worker_emits_events_and_shuts_down() {
    let test_db = TestDatabase::new().await;
    let worker = WorkerBuilder::new(test_db.db.clone())
        .with_config(WorkerConfig::default().with_poll_interval(50))
        .with_handler(NoOpHandler::new(JobType::SearchReindex))
        .build()
        .await;
    let mut events = worker.events();
    let handle = worker.start();

    test_db
        .db
        .jobs
        .queue(JobType::SearchReindex, json!({}), 0, 3)
        .await
        .unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(WorkerEvent::JobCompleted { job_type, .. }) = events.recv().await {
                return job_type;
            }
        }
    })
    .await
    .expect("job completed in time");
    assert_eq!(completed, JobType::SearchReindex);

    handle.shutdown().await.unwrap();
    test_db.cleanup().await;
}
