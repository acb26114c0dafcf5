//! # plinth-jobs
//!
//! Background job worker for plinth.
//!
//! This crate provides:
//! - The [`JobHandler`] trait, one handler per job type
//! - A polling worker that claims jobs by priority and runs them concurrently
//! - Bounded retries through the queue, with exhausted jobs parked as failed
//! - Worker events via a broadcast channel
//!
//! ## Example
//!
//! ```ignore
//! use plinth_jobs::{NoOpHandler, WorkerBuilder, WorkerConfig};
//! use plinth_db::Database;
//! use plinth_core::JobType;
//!
//! let db = Database::connect("postgres://...").await?;
//!
//! let worker = WorkerBuilder::new(db)
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .with_handler(NoOpHandler::new(JobType::SearchReindex))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod worker;

// Re-export core types
pub use plinth_core::*;

pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = plinth_core::defaults::JOB_POLL_INTERVAL_MS;
