//! Polling job worker.
//!
//! The worker claims up to `max_concurrent_jobs` at a time and processes
//! them concurrently, sleeping only when the queue is empty. On startup it
//! runs the stale-job recovery pass; recovery trouble is logged and never
//! prevents the worker from starting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use specmap_core::{defaults, Job, JobStore, Result};

use crate::handler::{JobContext, JobHandler, JobOutcome};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SPECMAP_JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `SPECMAP_JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `SPECMAP_JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("SPECMAP_JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("SPECMAP_JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("SPECMAP_JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was started.
    JobStarted { job_id: Uuid, job_type: String },
    /// A job completed successfully.
    JobFinished { job_id: Uuid, job_type: String },
    /// A job failed.
    JobFailed {
        job_id: Uuid,
        job_type: String,
        error: String,
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
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).await.map_err(|_| {
            specmap_core::Error::Internal("Failed to send shutdown signal".into())
        })?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Job worker that processes jobs from the store.
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    config: WorkerConfig,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(store: Arc<dyn JobStore>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            store,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
        }
    }

    /// Register a handler for its job type.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let job_type = handler.job_type().to_string();
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type.clone(), Arc::new(handler));
        debug!(%job_type, "registered job handler");
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        let worker_clone = worker.clone();

        tokio::spawn(async move {
            worker_clone.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent job processing.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        // jobs left running by a dead process are failed up front, best-effort
        match self.store.recover_stale(None).await {
            Ok(0) => {}
            Ok(recovered) => warn!(recovered, "recovered stale jobs from a previous process"),
            Err(err) => warn!(error = %err, "stale job recovery failed; continuing startup"),
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs;

        loop {
            // Check for shutdown before claiming jobs
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            // Claim up to max_concurrent jobs
            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                // Queue empty — sleep before polling again
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "processing concurrent job batch");
                // Wait for all claimed jobs to complete
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "job task panicked");
                    }
                }
                // No sleep — immediately try to claim more jobs
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Claim the next available job for any registered handler type.
    async fn claim_job(&self) -> Option<Job> {
        let job_types: Vec<String> = {
            let handlers = self.handlers.read().await;
            handlers.keys().cloned().collect()
        };

        for job_type in &job_types {
            match self.store.claim(Some(job_type)).await {
                Ok(Some(job)) => return Some(job),
                Ok(None) => continue,
                Err(e) => {
                    error!(error = ?e, %job_type, "failed to claim job");
                    return None;
                }
            }
        }
        None
    }

    /// Clone references needed for spawned job tasks.
    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            store: self.store.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    store: Arc<dyn JobStore>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorkerRef {
    /// Execute a single claimed job.
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type.clone();

        info!(%job_id, %job_type, "processing job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id,
            job_type: job_type.clone(),
        });

        // Find a handler for this job type
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job_type).cloned()
        };

        let outcome = match handler {
            Some(handler) => {
                let ctx = JobContext::new(job, self.store.clone());
                let job_timeout = Duration::from_secs(defaults::JOB_TIMEOUT_SECS);
                match tokio::time::timeout(job_timeout, handler.execute(ctx)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(%job_id, %job_type, "job exceeded timeout");
                        JobOutcome::Failed(vec![format!(
                            "job exceeded timeout of {}s",
                            defaults::JOB_TIMEOUT_SECS
                        )])
                    }
                }
            }
            None => {
                warn!(%job_type, "no handler registered for job type");
                JobOutcome::Failed(vec![format!("no handler for job type: {job_type}")])
            }
        };

        match outcome {
            JobOutcome::Finished(result) => {
                if let Err(e) = self.store.finish(job_id, result).await {
                    error!(error = ?e, %job_id, "failed to mark job as finished");
                } else {
                    info!(
                        %job_id,
                        %job_type,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "job finished"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFinished {
                        job_id,
                        job_type,
                    });
                }
            }
            JobOutcome::Failed(errors) => {
                if let Err(e) = self.store.fail(job_id, &errors).await {
                    error!(error = ?e, %job_id, "failed to mark job as failed");
                } else {
                    let error = errors.join("; ");
                    warn!(
                        %job_id,
                        %job_type,
                        %error,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "job failed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        job_type,
                        error,
                    });
                }
            }
        }
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    store: Arc<dyn JobStore>,
    config: WorkerConfig,
    handlers: Vec<Box<dyn JobHandler>>,
}

impl WorkerBuilder {
    /// Create a new worker builder.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let worker = JobWorker::new(self.store, self.config);

        for handler in self.handlers {
            let job_type = handler.job_type().to_string();
            let mut handlers = worker.handlers.write().await;
            handlers.insert(job_type, Arc::from(handler));
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
        assert_eq!(config.poll_interval_ms, defaults::JOB_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent_jobs, defaults::JOB_MAX_CONCURRENT);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_max_concurrent(8)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_config_max_concurrent_floors_at_one() {
        let config = WorkerConfig::default().with_max_concurrent(0);
        assert_eq!(config.max_concurrent_jobs, 1);
    }

    #[test]
    fn test_worker_event_clone_and_debug() {
        let job_id = Uuid::new_v4();
        let event = WorkerEvent::JobStarted {
            job_id,
            job_type: "extract_api_model".to_string(),
        };

        let cloned = event.clone();
        match cloned {
            WorkerEvent::JobStarted {
                job_id: id,
                job_type,
            } => {
                assert_eq!(id, job_id);
                assert_eq!(job_type, "extract_api_model");
            }
            _ => panic!("wrong event variant"),
        }

        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("JobStarted"));
        assert!(debug_str.contains("extract_api_model"));
    }
}
