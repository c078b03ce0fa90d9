//! Direct job scheduling: bind a unit of work to a fresh job and drive it
//! through the state machine.
//!
//! Request handlers use this to kick off an "orchestrate then merge" task
//! and return the job id immediately; the work runs on the runtime, and its
//! result or failure is persisted when it settles. Cancellation through the
//! returned handle is recorded on the job before it is surfaced.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use specmap_core::{defaults, Error, JobStore, Result};

use crate::handler::JobContext;

/// Schedules work bound to jobs in one store.
pub struct JobRunner {
    store: Arc<dyn JobStore>,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Create a job, claim it, and spawn `work` on the runtime.
    ///
    /// The job reaches `Finished` with the work's result, or `Failed` with
    /// its error message. Non-fatal errors appended through the context
    /// during execution survive on a finished job.
    pub async fn schedule<F, Fut>(
        &self,
        job_type: &str,
        input: JsonValue,
        work: F,
    ) -> Result<JobHandle>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        let job_id = self.store.create(job_type, input).await?;
        let job = self.store.claim_by_id(job_id).await?;
        let job_type = job.job_type.clone();

        let ctx = JobContext::new(job, self.store.clone());
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            let start = Instant::now();
            match work(ctx).await {
                Ok(result) => {
                    if let Err(store_error) = store.finish(job_id, result).await {
                        error!(%job_id, %store_error, "failed to record job result");
                    } else {
                        info!(
                            %job_id,
                            %job_type,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "job finished"
                        );
                    }
                }
                Err(job_error) => {
                    let line = job_error.to_string();
                    if let Err(store_error) = store.fail(job_id, &[line.clone()]).await {
                        error!(%job_id, %store_error, "failed to record job failure");
                    } else {
                        warn!(%job_id, %job_type, error = %line, "job failed");
                    }
                }
            }
        });

        Ok(JobHandle {
            job_id,
            store: self.store.clone(),
            task,
        })
    }
}

/// Handle to a scheduled job's backing task.
pub struct JobHandle {
    job_id: Uuid,
    store: Arc<dyn JobStore>,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Wait for the backing task to settle. The job's terminal state and
    /// result live in the store, not in this return value.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("job task did not settle cleanly: {e}")))
    }

    /// Abort the backing task and record the cancellation on the job.
    ///
    /// If the task already settled, its terminal state stands. Otherwise
    /// the job moves to `Failed` with a cancellation note.
    pub async fn cancel(self) -> Result<()> {
        self.task.abort();
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join_error) if join_error.is_cancelled() => {
                warn!(job_id = %self.job_id, "job task cancelled");
                self.store
                    .fail(self.job_id, &[defaults::CANCELLED_JOB_MESSAGE.to_string()])
                    .await
            }
            Err(join_error) => {
                let line = format!("job task panicked: {join_error}");
                self.store.fail(self.job_id, &[line.clone()]).await?;
                Err(Error::Internal(line))
            }
        }
    }
}
