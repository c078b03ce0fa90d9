//! Core traits for specmap abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Document, Job, JobStatusReport, ProgressUpdate};

/// Store for job and progress records.
///
/// The store owns the job state machine: jobs are created `Queued`, move to
/// `Running` through a single-winner claim, and end `Finished` or `Failed`.
/// All backings must provide the same claim guarantee: under concurrent
/// claimants, exactly one caller wins a given job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new job in `Queued` state, together with its progress record.
    async fn create(&self, job_type: &str, input: JsonValue) -> Result<Uuid>;

    /// Claim the oldest queued job, optionally filtered by type.
    ///
    /// Returns `None` when nothing is claimable. Losing a race for a
    /// particular job is not an error; the next candidate is tried.
    async fn claim(&self, job_type: Option<&str>) -> Result<Option<Job>>;

    /// Claim one specific queued job.
    ///
    /// # Errors
    /// `Error::ClaimLost` when the job exists but is no longer claimable,
    /// `Error::JobNotFound` when it does not exist.
    async fn claim_by_id(&self, job_id: Uuid) -> Result<Job>;

    /// Transition a running job to `Finished`, attaching its result.
    async fn finish(&self, job_id: Uuid, result: JsonValue) -> Result<()>;

    /// Transition a running job to `Failed`, attaching error lines
    /// (deduplicated, order-preserving).
    async fn fail(&self, job_id: Uuid, errors: &[String]) -> Result<()>;

    /// Append one non-fatal error line without changing status or any
    /// timestamp other than `updated_at`.
    async fn append_error(&self, job_id: Uuid, message: &str) -> Result<()>;

    /// Apply an advisory progress write. Counters advance by delta.
    /// Writes against unknown job ids are silently ignored.
    async fn update_progress(&self, job_id: Uuid, update: ProgressUpdate) -> Result<()>;

    /// Fetch a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Status snapshot for polling callers.
    ///
    /// # Errors
    /// `Error::JobNotFound` when the job does not exist.
    async fn status(&self, job_id: Uuid) -> Result<JobStatusReport>;

    /// Transition every `Running` job to `Failed` with a stale-job note.
    ///
    /// Best-effort: failure to recover one job must not prevent recovering
    /// the others. Returns the number of jobs recovered; idempotent.
    async fn recover_stale(&self, note: Option<&str>) -> Result<usize>;
}

/// Read-only source of documents, owned by the caller.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// List the documents belonging to one scope (a session, an upload
    /// batch, a crawl).
    async fn list_documents(&self, scope: Uuid) -> Result<Vec<Document>>;

    /// Fetch one document by id.
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;
}
