//! In-memory reference implementations of the store traits.
//!
//! `MemoryJobStore` keeps the whole state machine behind one mutex, which
//! makes the single-winner claim trivially correct. It exists for tests and
//! embedded callers; the production backings live in `specmap-jobs`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::{
    dedup_error_lines, Document, Job, JobProgress, JobStatus, JobStatusReport, ProgressUpdate,
};
use crate::traits::{DocumentSource, JobStore};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    progress: HashMap<Uuid, JobProgress>,
    /// Creation order, used to claim the oldest queued job first.
    order: Vec<Uuid>,
}

/// In-memory `JobStore` backed by a single mutex.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn mark_running(job: &mut Job) {
    let now = Utc::now();
    job.status = JobStatus::Running;
    job.started_at = Some(now);
    job.updated_at = now;
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job_type: &str, input: JsonValue) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.jobs.insert(
            id,
            Job {
                id,
                job_type: job_type.to_string(),
                status: JobStatus::Queued,
                input,
                result: None,
                errors: Vec::new(),
                created_at: now,
                started_at: None,
                updated_at: now,
                finished_at: None,
            },
        );
        state.progress.insert(id, JobProgress::empty(id));
        state.order.push(id);
        Ok(id)
    }

    async fn claim(&self, job_type: Option<&str>) -> Result<Option<Job>> {
        let mut state = self.state.lock().await;
        let order = state.order.clone();
        for id in order {
            let Some(job) = state.jobs.get_mut(&id) else {
                continue;
            };
            if job.status != JobStatus::Queued {
                continue;
            }
            if let Some(wanted) = job_type {
                if job.job_type != wanted {
                    continue;
                }
            }
            mark_running(job);
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn claim_by_id(&self, job_id: Uuid) -> Result<Job> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if job.status != JobStatus::Queued {
            return Err(Error::ClaimLost(job_id));
        }
        mark_running(job);
        Ok(job.clone())
    }

    async fn finish(&self, job_id: Uuid, result: JsonValue) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if job.status != JobStatus::Running {
            return Err(Error::Internal(format!(
                "cannot finish job {} in state {}",
                job_id,
                job.status.as_str()
            )));
        }
        let now = Utc::now();
        job.status = JobStatus::Finished;
        job.result = Some(result);
        job.updated_at = now;
        job.finished_at = Some(now);
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, errors: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if job.status != JobStatus::Running {
            return Err(Error::Internal(format!(
                "cannot fail job {} in state {}",
                job_id,
                job.status.as_str()
            )));
        }
        let now = Utc::now();
        for line in dedup_error_lines(errors) {
            if !job.errors.contains(&line) {
                job.errors.push(line);
            }
        }
        job.status = JobStatus::Failed;
        job.updated_at = now;
        job.finished_at = Some(now);
        Ok(())
    }

    async fn append_error(&self, job_id: Uuid, message: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&job_id).ok_or(Error::JobNotFound(job_id))?;
        job.errors.push(message.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, update: ProgressUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.jobs.contains_key(&job_id) {
            // advisory write against an unknown job; ignore
            return Ok(());
        }
        let progress = state
            .progress
            .entry(job_id)
            .or_insert_with(|| JobProgress::empty(job_id));
        update.apply(progress);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&job_id).cloned())
    }

    async fn status(&self, job_id: Uuid) -> Result<JobStatusReport> {
        let state = self.state.lock().await;
        let job = state.jobs.get(&job_id).ok_or(Error::JobNotFound(job_id))?;
        Ok(JobStatusReport {
            status: job.status,
            progress: state.progress.get(&job_id).cloned(),
            result: job.result.clone(),
            errors: job.errors.clone(),
        })
    }

    async fn recover_stale(&self, note: Option<&str>) -> Result<usize> {
        let note = note.unwrap_or(defaults::STALE_JOB_MESSAGE);
        let mut state = self.state.lock().await;
        let mut recovered = 0;
        for job in state.jobs.values_mut() {
            if job.status != JobStatus::Running {
                continue;
            }
            let now = Utc::now();
            if !job.errors.iter().any(|line| line == note) {
                job.errors.push(note.to_string());
            }
            job.status = JobStatus::Failed;
            job.updated_at = now;
            job.finished_at = Some(now);
            recovered += 1;
        }
        if recovered > 0 {
            debug!(recovered, "recovered stale running jobs");
        }
        Ok(recovered)
    }
}

/// In-memory `DocumentSource` for tests and embedded callers.
#[derive(Default)]
pub struct MemoryDocumentSource {
    state: Mutex<HashMap<Uuid, Vec<Document>>>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document under the given scope.
    pub async fn insert(&self, scope: Uuid, document: Document) {
        let mut state = self.state.lock().await;
        state.entry(scope).or_default().push(document);
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn list_documents(&self, scope: Uuid) -> Result<Vec<Document>> {
        let state = self.state.lock().await;
        Ok(state.get(&scope).cloned().unwrap_or_default())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state
            .values()
            .flatten()
            .find(|document| document.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_starts_queued_with_empty_progress() {
        let store = MemoryJobStore::new();
        let id = store.create("extract_api_model", json!({})).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.errors.is_empty());

        let report = store.status(id).await.unwrap();
        let progress = report.progress.unwrap();
        assert_eq!(progress.completed_units, 0);
        assert_eq!(progress.total_units, None);
    }

    #[tokio::test]
    async fn test_claim_oldest_first_and_type_filter() {
        let store = MemoryJobStore::new();
        let first = store.create("extract_api_model", json!(1)).await.unwrap();
        let second = store.create("extract_api_model", json!(2)).await.unwrap();
        let other = store.create("verify_values", json!(3)).await.unwrap();

        let claimed = store.claim(Some("extract_api_model")).await.unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Running);

        let claimed = store.claim(Some("verify_values")).await.unwrap().unwrap();
        assert_eq!(claimed.id, other);

        let claimed = store.claim(None).await.unwrap().unwrap();
        assert_eq!(claimed.id, second);

        assert!(store.claim(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_by_id_lost_after_claim() {
        let store = MemoryJobStore::new();
        let id = store.create("extract_api_model", json!({})).await.unwrap();

        store.claim_by_id(id).await.unwrap();
        assert!(matches!(
            store.claim_by_id(id).await,
            Err(Error::ClaimLost(_))
        ));
        assert!(matches!(
            store.claim_by_id(Uuid::new_v4()).await,
            Err(Error::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finish_requires_running() {
        let store = MemoryJobStore::new();
        let id = store.create("extract_api_model", json!({})).await.unwrap();

        assert!(store.finish(id, json!("done")).await.is_err());

        store.claim_by_id(id).await.unwrap();
        store.finish(id, json!("done")).await.unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        assert!(job.finished_at.is_some());
        assert_eq!(job.result, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_fail_dedupes_error_lines() {
        let store = MemoryJobStore::new();
        let id = store.create("extract_api_model", json!({})).await.unwrap();
        store.claim_by_id(id).await.unwrap();

        store
            .fail(
                id,
                &[
                    "boom".to_string(),
                    "boom".to_string(),
                    "other".to_string(),
                ],
            )
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors, vec!["boom".to_string(), "other".to_string()]);
    }

    #[tokio::test]
    async fn test_append_error_keeps_status() {
        let store = MemoryJobStore::new();
        let id = store.create("extract_api_model", json!({})).await.unwrap();
        store.claim_by_id(id).await.unwrap();
        store.finish(id, json!({"entities": 4})).await.unwrap();

        store.append_error(id, "chunk 2 unparseable").await.unwrap();

        // partial success: finished with a non-empty error list
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.errors, vec!["chunk 2 unparseable".to_string()]);
    }

    #[tokio::test]
    async fn test_update_progress_unknown_job_ignored() {
        let store = MemoryJobStore::new();
        store
            .update_progress(Uuid::new_v4(), ProgressUpdate::advance(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recover_stale_idempotent() {
        let store = MemoryJobStore::new();
        let id = store.create("extract_api_model", json!({})).await.unwrap();
        store.claim_by_id(id).await.unwrap();

        assert_eq!(store.recover_stale(None).await.unwrap(), 1);
        assert_eq!(store.recover_stale(None).await.unwrap(), 0);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.errors,
            vec![defaults::STALE_JOB_MESSAGE.to_string()]
        );
    }

    #[tokio::test]
    async fn test_document_source_scoping() {
        let source = MemoryDocumentSource::new();
        let scope = Uuid::new_v4();
        let doc = Document {
            id: Uuid::new_v4(),
            content: "GET /v1/users".to_string(),
            metadata: Default::default(),
        };
        source.insert(scope, doc.clone()).await;

        let listed = source.list_documents(scope).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(source
            .list_documents(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            source.get_document(doc.id).await.unwrap().unwrap().content,
            doc.content
        );
    }
}
