//! # specmap-jobs
//!
//! Crash-safe background job tracking for specmap.
//!
//! This crate provides:
//! - Two production `JobStore` backings with the same single-winner claim
//!   contract: one filesystem-based (atomic rename between status
//!   directories) and one Postgres-based (conditional update)
//! - A `JobRunner` that binds a unit of work to a job and drives it through
//!   the state machine, including cancellation
//! - A polling `JobWorker` with a handler registry, concurrent claim
//!   batches, broadcast events, and startup recovery of stale jobs
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use specmap_jobs::{FsJobStore, JobWorker, NoOpHandler, WorkerBuilder, WorkerConfig};
//!
//! let store = Arc::new(FsJobStore::open("/var/lib/specmap/jobs").await?);
//!
//! let worker = WorkerBuilder::new(store.clone())
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .with_handler(NoOpHandler::new("extract_api_model"))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! // ...
//! handle.shutdown().await?;
//! ```

pub mod fs;
pub mod handler;
pub mod pg;
pub mod runner;
pub mod worker;

// Re-export core types
pub use specmap_core::*;

pub use fs::FsJobStore;
pub use handler::{JobContext, JobHandler, JobOutcome, NoOpHandler};
pub use pg::PgJobStore;
pub use runner::{JobHandle, JobRunner};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = specmap_core::defaults::JOB_POLL_INTERVAL_MS;
