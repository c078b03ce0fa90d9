//! Job handler contract shared by the runner and the worker.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use specmap_core::{Job, JobStore, ProgressUpdate};

/// Context provided to executing job code.
///
/// Progress and error writes go through the store and are advisory: a
/// failed write is logged, never propagated into the job's own outcome.
pub struct JobContext {
    job: Job,
    store: Arc<dyn JobStore>,
}

impl JobContext {
    pub fn new(job: Job, store: Arc<dyn JobStore>) -> Self {
        Self { job, store }
    }

    /// The job being processed.
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// The job's input payload.
    pub fn input(&self) -> &JsonValue {
        &self.job.input
    }

    /// Shared handle to the job store, for orchestrators running under
    /// this job.
    pub fn store(&self) -> Arc<dyn JobStore> {
        self.store.clone()
    }

    /// Apply an advisory progress write.
    pub async fn progress(&self, update: ProgressUpdate) {
        if let Err(error) = self.store.update_progress(self.job.id, update).await {
            warn!(job_id = %self.job.id, %error, "failed to write job progress");
        }
    }

    /// Record one non-fatal error line on the job.
    pub async fn append_error(&self, message: &str) {
        if let Err(error) = self.store.append_error(self.job.id, message).await {
            warn!(job_id = %self.job.id, %error, "failed to record job error");
        }
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobOutcome {
    /// Job completed with a result. The job may still carry non-fatal
    /// error lines appended during execution.
    Finished(JsonValue),
    /// Job failed with one or more error lines.
    Failed(Vec<String>),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type string this handler processes.
    fn job_type(&self) -> &str;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobOutcome;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: &str) -> bool {
        self.job_type() == job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: String,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
        }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> &str {
        &self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        ctx.progress(ProgressUpdate::total(1).with_stage("working")).await;
        ctx.progress(ProgressUpdate::advance(1)).await;
        JobOutcome::Finished(JsonValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specmap_core::{JobStatus, MemoryJobStore};

    async fn claimed_job(store: &Arc<dyn JobStore>) -> Job {
        let id = store
            .create("noop", json!({"documents": 3}))
            .await
            .unwrap();
        store.claim_by_id(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_context_accessors() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let job = claimed_job(&store).await;
        let job_id = job.id;

        let ctx = JobContext::new(job, store.clone());
        assert_eq!(ctx.job_id(), job_id);
        assert_eq!(ctx.input()["documents"], 3);
        assert_eq!(ctx.job().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_context_progress_and_errors_reach_store() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let job = claimed_job(&store).await;
        let job_id = job.id;

        let ctx = JobContext::new(job, store.clone());
        ctx.progress(ProgressUpdate::total(2)).await;
        ctx.progress(ProgressUpdate::advance(1)).await;
        ctx.append_error("chunk 4 unparseable").await;

        let report = store.status(job_id).await.unwrap();
        let progress = report.progress.unwrap();
        assert_eq!(progress.total_units, Some(2));
        assert_eq!(progress.completed_units, 1);
        assert_eq!(report.errors, vec!["chunk 4 unparseable".to_string()]);
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let job = claimed_job(&store).await;

        let handler = NoOpHandler::new("noop");
        assert!(handler.can_handle("noop"));
        assert!(!handler.can_handle("extract_api_model"));

        let outcome = handler.execute(JobContext::new(job, store)).await;
        assert!(matches!(outcome, JobOutcome::Finished(JsonValue::Null)));
    }
}
