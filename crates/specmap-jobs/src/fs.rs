//! Filesystem-backed job store.
//!
//! Each job is one JSON file that moves between the `queued/`, `running/`,
//! `finished/`, and `failed/` directories. Every mutation writes to a temp
//! file and commits with `rename`, and the `queued -> running` move itself
//! is a rename, which is what makes the claim single-winner: the filesystem
//! lets exactly one concurrent rename of a given source path succeed.
//!
//! Progress lives in a sibling `progress/` directory. Read-modify-write
//! cycles on job and progress files are serialized behind one store-level
//! mutex; cross-process writers are not supported for the same root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use specmap_core::{
    dedup_error_lines, defaults, Error, Job, JobProgress, JobStatus, JobStatusReport, JobStore,
    ProgressUpdate, Result,
};

const PROGRESS_DIR: &str = "progress";
const TMP_DIR: &str = "tmp";

/// Filesystem `JobStore` rooted at one directory.
pub struct FsJobStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsJobStore {
    /// Open (and create if needed) a store under `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Finished,
            JobStatus::Failed,
        ] {
            tokio::fs::create_dir_all(root.join(status.as_str())).await?;
        }
        tokio::fs::create_dir_all(root.join(PROGRESS_DIR)).await?;
        tokio::fs::create_dir_all(root.join(TMP_DIR)).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn status_dir(&self, status: JobStatus) -> PathBuf {
        self.root.join(status.as_str())
    }

    fn job_path(&self, status: JobStatus, job_id: Uuid) -> PathBuf {
        self.status_dir(status).join(format!("{job_id}.json"))
    }

    fn progress_path(&self, job_id: Uuid) -> PathBuf {
        self.root.join(PROGRESS_DIR).join(format!("{job_id}.json"))
    }

    /// Write JSON atomically: temp file first, then rename onto `path`.
    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = self
            .root
            .join(TMP_DIR)
            .join(format!("{}.json", Uuid::new_v4()));
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_job(&self, path: &Path) -> Result<Job> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Find which status directory currently holds the job.
    async fn locate(&self, job_id: Uuid) -> Result<Option<(JobStatus, PathBuf)>> {
        for status in [
            JobStatus::Running,
            JobStatus::Queued,
            JobStatus::Finished,
            JobStatus::Failed,
        ] {
            let path = self.job_path(status, job_id);
            if tokio::fs::try_exists(&path).await? {
                return Ok(Some((status, path)));
            }
        }
        Ok(None)
    }

    /// Sorted file names in one status directory. UUIDv7 job ids make the
    /// lexicographic order the creation order.
    async fn list_status_dir(&self, status: JobStatus) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(self.status_dir(status)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Rewrite a freshly claimed job as running.
    async fn mark_running(&self, mut job: Job) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.updated_at = now;
        self.write_json(&self.job_path(JobStatus::Running, job.id), &job)
            .await?;
        info!(job_id = %job.id, job_type = %job.job_type, "claimed job");
        Ok(job)
    }

    /// Move one running job into a terminal state.
    async fn settle(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<JsonValue>,
        errors: &[String],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let running_path = self.job_path(JobStatus::Running, job_id);
        let mut job = match self.read_job(&running_path).await {
            Ok(job) => job,
            Err(_) => {
                return match self.locate(job_id).await? {
                    Some((state, _)) => Err(Error::Internal(format!(
                        "cannot move job {} from state {} to {}",
                        job_id,
                        state.as_str(),
                        status.as_str()
                    ))),
                    None => Err(Error::JobNotFound(job_id)),
                };
            }
        };

        let now = Utc::now();
        job.status = status;
        job.result = result;
        for line in dedup_error_lines(errors) {
            if !job.errors.contains(&line) {
                job.errors.push(line);
            }
        }
        job.updated_at = now;
        job.finished_at = Some(now);

        self.write_json(&self.job_path(status, job_id), &job).await?;
        tokio::fs::remove_file(&running_path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FsJobStore {
    async fn create(&self, job_type: &str, input: JsonValue) -> Result<Uuid> {
        let job_id = Uuid::now_v7();
        let now = Utc::now();
        let job = Job {
            id: job_id,
            job_type: job_type.to_string(),
            status: JobStatus::Queued,
            input,
            result: None,
            errors: Vec::new(),
            created_at: now,
            started_at: None,
            updated_at: now,
            finished_at: None,
        };

        self.write_json(&self.progress_path(job_id), &JobProgress::empty(job_id))
            .await?;
        self.write_json(&self.job_path(JobStatus::Queued, job_id), &job)
            .await?;
        debug!(%job_id, job_type, "queued job");
        Ok(job_id)
    }

    async fn claim(&self, job_type: Option<&str>) -> Result<Option<Job>> {
        for name in self.list_status_dir(JobStatus::Queued).await? {
            let queued_path = self.status_dir(JobStatus::Queued).join(&name);

            // a concurrent claimant may move the file between listing and
            // reading; a vanished or torn file just means "next candidate"
            let job = match self.read_job(&queued_path).await {
                Ok(job) => job,
                Err(_) => continue,
            };
            if let Some(wanted) = job_type {
                if job.job_type != wanted {
                    continue;
                }
            }

            let running_path = self.job_path(JobStatus::Running, job.id);
            match tokio::fs::rename(&queued_path, &running_path).await {
                Ok(()) => return Ok(Some(self.mark_running(job).await?)),
                Err(e) if e.kind() == ErrorKind::NotFound => continue, // lost the race
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    async fn claim_by_id(&self, job_id: Uuid) -> Result<Job> {
        let queued_path = self.job_path(JobStatus::Queued, job_id);
        let job = match self.read_job(&queued_path).await {
            Ok(job) => job,
            Err(_) => {
                return match self.locate(job_id).await? {
                    Some(_) => Err(Error::ClaimLost(job_id)),
                    None => Err(Error::JobNotFound(job_id)),
                };
            }
        };

        let running_path = self.job_path(JobStatus::Running, job_id);
        match tokio::fs::rename(&queued_path, &running_path).await {
            Ok(()) => self.mark_running(job).await,
            Err(e) if e.kind() == ErrorKind::NotFound => match self.locate(job_id).await? {
                Some(_) => Err(Error::ClaimLost(job_id)),
                None => Err(Error::JobNotFound(job_id)),
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn finish(&self, job_id: Uuid, result: JsonValue) -> Result<()> {
        self.settle(job_id, JobStatus::Finished, Some(result), &[])
            .await?;
        info!(%job_id, "job finished");
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, errors: &[String]) -> Result<()> {
        self.settle(job_id, JobStatus::Failed, None, errors).await?;
        warn!(%job_id, error_count = errors.len(), "job failed");
        Ok(())
    }

    async fn append_error(&self, job_id: Uuid, message: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let Some((_, path)) = self.locate(job_id).await? else {
            return Err(Error::JobNotFound(job_id));
        };
        let mut job = self.read_job(&path).await?;
        job.errors.push(message.to_string());
        job.updated_at = Utc::now();
        self.write_json(&path, &job).await
    }

    async fn update_progress(&self, job_id: Uuid, update: ProgressUpdate) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.locate(job_id).await?.is_none() {
            // advisory write against an unknown job; ignore
            return Ok(());
        }

        let path = self.progress_path(job_id);
        let mut progress = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(_) => JobProgress::empty(job_id),
        };
        update.apply(&mut progress);
        self.write_json(&path, &progress).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        match self.locate(job_id).await? {
            Some((_, path)) => Ok(Some(self.read_job(&path).await?)),
            None => Ok(None),
        }
    }

    async fn status(&self, job_id: Uuid) -> Result<JobStatusReport> {
        let job = self
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;
        let progress = match tokio::fs::read(self.progress_path(job_id)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(_) => None,
        };
        Ok(JobStatusReport {
            status: job.status,
            progress,
            result: job.result,
            errors: job.errors,
        })
    }

    async fn recover_stale(&self, note: Option<&str>) -> Result<usize> {
        let note = note.unwrap_or(defaults::STALE_JOB_MESSAGE);
        let mut recovered = 0;

        for name in self.list_status_dir(JobStatus::Running).await? {
            let running_path = self.status_dir(JobStatus::Running).join(&name);
            let outcome: Result<()> = async {
                let mut job = self.read_job(&running_path).await?;
                let now = Utc::now();
                if !job.errors.iter().any(|line| line == note) {
                    job.errors.push(note.to_string());
                }
                job.status = JobStatus::Failed;
                job.updated_at = now;
                job.finished_at = Some(now);
                self.write_json(&self.job_path(JobStatus::Failed, job.id), &job)
                    .await?;
                tokio::fs::remove_file(&running_path).await?;
                Ok(())
            }
            .await;

            match outcome {
                Ok(()) => recovered += 1,
                // best-effort: one bad file must not block the others
                Err(error) => warn!(file = %name, %error, "failed to recover stale job"),
            }
        }

        if recovered > 0 {
            info!(recovered, "recovered stale running jobs");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (TempDir, FsJobStore) {
        let dir = TempDir::new().unwrap();
        let store = FsJobStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_creates_layout() {
        let (dir, _store) = store().await;
        for sub in ["queued", "running", "finished", "failed", "progress", "tmp"] {
            assert!(dir.path().join(sub).is_dir(), "missing {sub}/");
        }
    }

    #[tokio::test]
    async fn test_create_claim_finish_moves_files() {
        let (dir, store) = store().await;
        let job_id = store
            .create("extract_api_model", json!({"scope": "s1"}))
            .await
            .unwrap();
        assert!(dir.path().join(format!("queued/{job_id}.json")).exists());

        let job = store.claim(None).await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert!(!dir.path().join(format!("queued/{job_id}.json")).exists());
        assert!(dir.path().join(format!("running/{job_id}.json")).exists());

        store.finish(job_id, json!({"classes": 3})).await.unwrap();
        assert!(!dir.path().join(format!("running/{job_id}.json")).exists());
        assert!(dir.path().join(format!("finished/{job_id}.json")).exists());

        let report = store.status(job_id).await.unwrap();
        assert_eq!(report.status, JobStatus::Finished);
        assert_eq!(report.result, Some(json!({"classes": 3})));
    }

    #[tokio::test]
    async fn test_claim_respects_type_filter_and_order() {
        let (_dir, store) = store().await;
        let first = store.create("extract", json!(1)).await.unwrap();
        let second = store.create("verify", json!(2)).await.unwrap();
        let third = store.create("extract", json!(3)).await.unwrap();

        assert_eq!(
            store.claim(Some("verify")).await.unwrap().unwrap().id,
            second
        );
        assert_eq!(
            store.claim(Some("extract")).await.unwrap().unwrap().id,
            first
        );
        assert_eq!(store.claim(None).await.unwrap().unwrap().id, third);
        assert!(store.claim(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_by_id_single_winner() {
        let (_dir, store) = store().await;
        let job_id = store.create("extract", json!({})).await.unwrap();

        store.claim_by_id(job_id).await.unwrap();
        assert!(matches!(
            store.claim_by_id(job_id).await,
            Err(Error::ClaimLost(_))
        ));
        assert!(matches!(
            store.claim_by_id(Uuid::now_v7()).await,
            Err(Error::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_dedupes_errors() {
        let (_dir, store) = store().await;
        let job_id = store.create("extract", json!({})).await.unwrap();
        store.claim_by_id(job_id).await.unwrap();

        store
            .fail(
                job_id,
                &["boom".to_string(), "boom".to_string(), "later".to_string()],
            )
            .await
            .unwrap();

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors, vec!["boom".to_string(), "later".to_string()]);
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_append_error_preserves_terminal_state() {
        let (_dir, store) = store().await;
        let job_id = store.create("extract", json!({})).await.unwrap();
        store.claim_by_id(job_id).await.unwrap();
        store.finish(job_id, json!({"entities": 9})).await.unwrap();

        store
            .append_error(job_id, "document 2 chunk 5: extraction call failed")
            .await
            .unwrap();

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.result, Some(json!({"entities": 9})));
    }

    #[tokio::test]
    async fn test_finish_from_wrong_state_rejected() {
        let (_dir, store) = store().await;
        let job_id = store.create("extract", json!({})).await.unwrap();

        // still queued
        assert!(store.finish(job_id, json!(null)).await.is_err());

        store.claim_by_id(job_id).await.unwrap();
        store.finish(job_id, json!(null)).await.unwrap();

        // already terminal
        assert!(store.fail(job_id, &["late".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_update_progress_accumulates_and_ignores_unknown() {
        let (_dir, store) = store().await;
        let job_id = store.create("extract", json!({})).await.unwrap();
        store.claim_by_id(job_id).await.unwrap();

        store
            .update_progress(
                job_id,
                ProgressUpdate::total(4).with_stage("extracting"),
            )
            .await
            .unwrap();
        for _ in 0..3 {
            store
                .update_progress(job_id, ProgressUpdate::advance(1))
                .await
                .unwrap();
        }

        let progress = store.status(job_id).await.unwrap().progress.unwrap();
        assert_eq!(progress.total_units, Some(4));
        assert_eq!(progress.completed_units, 3);

        // unknown job: silently ignored
        store
            .update_progress(Uuid::now_v7(), ProgressUpdate::advance(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recover_stale_is_idempotent() {
        let (dir, store) = store().await;
        let job_id = store.create("extract", json!({})).await.unwrap();
        store.claim_by_id(job_id).await.unwrap();
        drop(store);

        // a new process opens the same root and finds the stale running job
        let reopened = FsJobStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.recover_stale(None).await.unwrap(), 1);
        assert_eq!(reopened.recover_stale(None).await.unwrap(), 0);

        let job = reopened.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.errors, vec![defaults::STALE_JOB_MESSAGE.to_string()]);
    }
}
