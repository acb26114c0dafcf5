//! Job queue claim, retry and failed-job recovery.

use chrono::{Duration, Utc};
use serde_json::json;

use crate::test_fixtures::TestDatabase;
use crate::{JobRepository, JobStatus, JobType};
use plinth_core::defaults::JOB_MAX_ATTEMPTS;

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_claim_prefers_priority_then_age() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    let low = jobs
        .queue(JobType::SearchReindex, json!({}), 0, 3)
        .await
        .unwrap();
    let high = jobs
        .queue(JobType::SendEmail, json!({"to": "a@b.co"}), 10, 3)
        .await
        .unwrap();

    let first = jobs.claim_next(&[]).await.unwrap().unwrap();
    assert_eq!(first.id, high);
    assert_eq!(first.status, JobStatus::Running);
    assert_eq!(first.attempts, 1);

    let second = jobs.claim_next(&[]).await.unwrap().unwrap();
    assert_eq!(second.id, low);
    assert!(jobs.claim_next(&[]).await.unwrap().is_none());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_claim_filters_by_type() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    jobs.queue(JobType::SendEmail, json!({}), 10, 3).await.unwrap();
    let index = jobs
        .queue(JobType::SearchIndex, json!({"post_id": "x"}), 5, 3)
        .await
        .unwrap();

    let claimed = jobs
        .claim_next(&[JobType::SearchIndex, JobType::SearchRemove])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, index);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_fail_retries_until_attempts_exhausted() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    let id = jobs
        .queue(JobType::SendEmail, json!({"to": "a@b.co"}), 10, 2)
        .await
        .unwrap();

    jobs.claim_next(&[]).await.unwrap().unwrap();
    assert_eq!(jobs.fail(id, "smtp down").await.unwrap(), JobStatus::Pending);
    let job = jobs.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.error_message.as_deref(), Some("smtp down"));

    jobs.claim_next(&[]).await.unwrap().unwrap();
    assert_eq!(jobs.fail(id, "still down").await.unwrap(), JobStatus::Failed);

    assert!(jobs.get(id).await.unwrap().is_none(), "parked jobs leave the queue");
    let failed = jobs.list_failed(10, 0).await.unwrap();
    assert_eq!(failed.total, 1);
    assert_eq!(failed.items[0].job_id, id);
    assert_eq!(failed.items[0].attempts, 2);
    assert_eq!(failed.items[0].error_message, "still down");
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_retry_failed_requeues_with_fresh_attempts() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    let id = jobs
        .queue(JobType::MediaCleanup, json!({"path": "blobs/aa/bb/x.bin"}), 1, 3)
        .await
        .unwrap();
    jobs.claim_next(&[]).await.unwrap().unwrap();
    jobs.fail_permanently(id, "bad payload").await.unwrap();

    let failed = jobs.list_failed(10, 0).await.unwrap();
    let new_id = jobs.retry_failed(failed.items[0].id).await.unwrap();

    let job = jobs.get(new_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, JOB_MAX_ATTEMPTS);
    assert_eq!(job.priority, 1, "priority survives parking");
    assert_eq!(job.payload, json!({"path": "blobs/aa/bb/x.bin"}));
    assert_eq!(jobs.list_failed(10, 0).await.unwrap().total, 0);

    let err = jobs.retry_failed(failed.items[0].id).await.unwrap_err();
    assert!(matches!(err, crate::Error::NotFound(_)));
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_retry_all_and_flush_failed() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    for n in 0..3 {
        let id = jobs
            .queue(JobType::SearchIndex, json!({"n": n}), 5, 1)
            .await
            .unwrap();
        jobs.claim_next(&[]).await.unwrap().unwrap();
        jobs.fail(id, "engine down").await.unwrap();
    }
    assert_eq!(jobs.stats().await.unwrap().failed, 3);

    assert_eq!(jobs.retry_all_failed().await.unwrap(), 3);
    assert_eq!(jobs.pending_count().await.unwrap(), 3);

    // Requeued jobs get the full attempt budget back, so one more failure
    // only returns them to the queue.
    let mut claimed = Vec::new();
    for _ in 0..3 {
        let job = jobs.claim_next(&[]).await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.max_attempts, JOB_MAX_ATTEMPTS);
        assert_eq!(job.priority, 5);
        claimed.push(job.id);
    }
    for id in claimed {
        assert_eq!(jobs.fail(id, "engine down").await.unwrap(), JobStatus::Pending);
    }
    assert_eq!(jobs.stats().await.unwrap().failed, 0);

    // Use up the remaining attempts.
    let mut parked = 0;
    while let Some(job) = jobs.claim_next(&[]).await.unwrap() {
        if jobs.fail(job.id, "engine down").await.unwrap() == JobStatus::Failed {
            parked += 1;
        }
    }
    assert_eq!(parked, 3);
    assert_eq!(jobs.pending_count().await.unwrap(), 0);
    assert_eq!(jobs.stats().await.unwrap().failed, 3);

    assert_eq!(jobs.flush_failed().await.unwrap(), 3);
    assert_eq!(jobs.stats().await.unwrap().failed, 0);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_deduplicated_queue_skips_identical_pending_job() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    let payload = json!({"post_id": "0191e4c0-0000-7000-8000-000000000001"});
    let first = jobs
        .queue_deduplicated(JobType::SearchIndex, payload.clone(), 5)
        .await
        .unwrap();
    let second = jobs
        .queue_deduplicated(JobType::SearchIndex, payload, 5)
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(jobs.pending_count().await.unwrap(), 1);
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_reset_stale_returns_running_jobs_to_pending() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    let id = jobs
        .queue(JobType::SearchReindex, json!({}), 0, 3)
        .await
        .unwrap();
    jobs.claim_next(&[]).await.unwrap().unwrap();

    // Nothing started before an hour ago.
    assert_eq!(jobs.reset_stale(Utc::now() - Duration::hours(1)).await.unwrap(), 0);
    assert_eq!(jobs.reset_stale(Utc::now() + Duration::seconds(1)).await.unwrap(), 1);

    let job = jobs.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.started_at.is_none());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires running PostgreSQL"]
async fn test_complete_records_result() {
    let test_db = TestDatabase::new().await;
    let jobs = &test_db.db.jobs;

    let id = jobs
        .queue(JobType::SearchReindex, json!({}), 0, 3)
        .await
        .unwrap();
    jobs.claim_next(&[]).await.unwrap().unwrap();
    jobs.complete(id, Some(json!({"indexed": 12}))).await.unwrap();

    let job = jobs.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"indexed": 12})));
    assert!(job.completed_at.is_some());

    let stats = jobs.stats().await.unwrap();
    assert_eq!(stats.completed_last_hour, 1);
    test_db.cleanup().await;
}
