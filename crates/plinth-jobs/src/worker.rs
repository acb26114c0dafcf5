//! Job worker and runner for processing background jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use plinth_core::{defaults, Job, JobRepository, JobStatus, JobType, Result};
use plinth_db::Database;

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Per-job execution timeout in seconds.
    pub job_timeout_secs: u64,
    /// Running jobs started longer ago than this are reset at startup.
    pub stale_after_secs: i64,
    /// Completed jobs older than this are deleted at startup.
    pub retention_days: i64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            stale_after_secs: defaults::JOB_STALE_AFTER_SECS,
            retention_days: defaults::JOB_RETENTION_DAYS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `300` | Per-job timeout |
    /// | `JOB_STALE_AFTER_SECS` | `900` | Age at which running jobs count as abandoned |
    /// | `JOB_RETENTION_DAYS` | `7` | Age at which completed jobs are pruned |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS)
            .max(1);

        let stale_after_secs = std::env::var("JOB_STALE_AFTER_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::JOB_STALE_AFTER_SECS);

        let retention_days = std::env::var("JOB_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::JOB_RETENTION_DAYS)
            .max(0);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            job_timeout_secs,
            stale_after_secs,
            retention_days,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was started.
    JobStarted { job_id: Uuid, job_type: JobType },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, job_type: JobType },
    /// A job failed. `will_retry` is false once it has been parked.
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
        will_retry: bool,
    },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully. Jobs already running finish
    /// first.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| plinth_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

type HandlerMap = Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>;

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    db: Database,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    notify: Arc<Notify>,
}

impl JobWorker {
    pub fn new(db: Database, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        let notify = db.jobs.job_notify();
        Self {
            db,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            notify,
        }
    }

    /// Register a handler for a job type, replacing any earlier one.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let job_type = handler.job_type();
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type, Arc::new(handler));
        debug!(%job_type, "Registered job handler");
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and waits for the batch.
    /// Only sleeps when the queue is empty, and wakes early when a job is
    /// queued through the same `Database`.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        self.recover_stale().await;
        self.prune_completed().await;

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let claimed = self.run_batch().await;

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = self.notify.notified() => {
                        debug!("Woken by queue notification");
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Claim and run one batch of jobs. Returns how many were claimed.
    pub async fn run_batch(&self) -> usize {
        let mut tasks = tokio::task::JoinSet::new();

        for _ in 0..self.config.max_concurrent_jobs.max(1) {
            match self.claim_job().await {
                Some(job) => {
                    let worker = self.clone_refs();
                    tasks.spawn(async move {
                        worker.execute_job(job).await;
                    });
                }
                None => break,
            }
        }

        let claimed = tasks.len();
        if claimed > 0 {
            debug!(claimed, "Processing concurrent job batch");
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Job task panicked");
            }
        }
        claimed
    }

    /// Return abandoned running jobs to the queue.
    async fn recover_stale(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.stale_after_secs);
        match self.db.jobs.reset_stale(cutoff).await {
            Ok(0) => {}
            Ok(reset) => warn!(reset, "Reset stale running jobs to pending"),
            Err(e) => error!(error = %e, "Failed to reset stale jobs"),
        }
    }

    async fn prune_completed(&self) {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        match self.db.jobs.cleanup_completed(cutoff).await {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "Pruned old completed jobs"),
            Err(e) => warn!(error = %e, "Failed to prune completed jobs"),
        }
    }

    /// Claim the next job. Jobs of unregistered types are claimed too so
    /// they fail visibly instead of waiting forever.
    async fn claim_job(&self) -> Option<Job> {
        match self.db.jobs.claim_next(&[]).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                None
            }
        }
    }

    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            db: self.db.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            timeout: Duration::from_secs(self.config.job_timeout_secs),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.db.jobs.pending_count().await
    }
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    db: Database,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    timeout: Duration,
}

impl JobWorkerRef {
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;
        let attempt = job.attempts;

        info!(%job_id, %job_type, attempt, "Processing job");
        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, job_type });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job_type).cloned()
        };

        let result = match handler {
            Some(handler) => {
                match tokio::time::timeout(self.timeout, handler.execute(JobContext::new(job))).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(%job_id, %job_type, timeout_secs = self.timeout.as_secs(), "Job exceeded timeout");
                        JobResult::Retry(format!(
                            "Job exceeded timeout of {}s",
                            self.timeout.as_secs()
                        ))
                    }
                }
            }
            None => {
                warn!(%job_type, "No handler registered for job type");
                JobResult::Failed(format!("No handler for job type: {}", job_type))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            JobResult::Success(result_data) => {
                if let Err(e) = self.db.jobs.complete(job_id, result_data).await {
                    error!(error = %e, %job_id, "Failed to mark job as completed");
                } else {
                    info!(%job_id, %job_type, duration_ms, "Job completed successfully");
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::JobCompleted { job_id, job_type });
                }
            }
            JobResult::Failed(error) => {
                if let Err(e) = self.db.jobs.fail_permanently(job_id, &error).await {
                    error!(error = %e, %job_id, "Failed to park job");
                } else {
                    warn!(%job_id, %job_type, %error, duration_ms, "Job failed permanently");
                    self.emit_failed(job_id, job_type, error, false);
                }
            }
            JobResult::Retry(error) => match self.db.jobs.fail(job_id, &error).await {
                Ok(status) => {
                    let will_retry = status == JobStatus::Pending;
                    warn!(%job_id, %job_type, %error, will_retry, duration_ms, "Job failed");
                    self.emit_failed(job_id, job_type, error, will_retry);
                }
                Err(e) => error!(error = %e, %job_id, "Failed to record job failure"),
            },
        }
    }

    fn emit_failed(&self, job_id: Uuid, job_type: JobType, error: String, will_retry: bool) {
        let _ = self.event_tx.send(WorkerEvent::JobFailed {
            job_id,
            job_type,
            error,
            will_retry,
        });
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    db: Database,
    config: WorkerConfig,
    handlers: Vec<Box<dyn JobHandler>>,
}

impl WorkerBuilder {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let worker = JobWorker::new(self.db, self.config);

        {
            let mut handlers = worker.handlers.write().await;
            for handler in self.handlers {
                handlers.insert(handler.job_type(), Arc::from(handler));
            }
        }

        worker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.job_timeout_secs, 300);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_max_concurrent(8)
            .with_job_timeout(5)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.job_timeout_secs, 5);
        assert!(!config.enabled);
    }

    #[test]
    fn test_stale_window_outlasts_timeout() {
        let config = WorkerConfig::default();
        assert!(config.stale_after_secs as u64 > config.job_timeout_secs);
    }

    #[test]
    fn test_worker_event_clone() {
        let event = WorkerEvent::JobFailed {
            job_id: Uuid::new_v4(),
            job_type: JobType::SendEmail,
            error: "relay down".to_string(),
            will_retry: true,
        };
        match event.clone() {
            WorkerEvent::JobFailed { will_retry, .. } => assert!(will_retry),
            _ => panic!("wrong variant"),
        }
    }
}
