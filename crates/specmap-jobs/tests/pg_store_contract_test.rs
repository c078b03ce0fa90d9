//! Contract tests for the Postgres job store.
//!
//! These need a live database:
//! `SPECMAP_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

use std::sync::Arc;

use serde_json::json;

use specmap_core::{JobStatus, JobStore, ProgressUpdate};
use specmap_jobs::PgJobStore;

async fn open_store() -> Arc<PgJobStore> {
    let url = std::env::var("SPECMAP_TEST_DATABASE_URL")
        .expect("SPECMAP_TEST_DATABASE_URL must be set for Postgres contract tests");
    let store = PgJobStore::connect(&url).await.unwrap();
    store.ensure_schema().await.unwrap();
    Arc::new(store)
}

#[tokio::test]
#[ignore = "requires a live Postgres instance"]
async fn test_lifecycle_queued_running_finished() {
    let store = open_store().await;
    let job_id = store
        .create("pg_contract_lifecycle", json!({"scope": "s1"}))
        .await
        .unwrap();

    let job = store.claim(Some("pg_contract_lifecycle")).await.unwrap().unwrap();
    assert_eq!(job.id, job_id);
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.started_at.is_some());

    store
        .update_progress(job_id, ProgressUpdate::total(3).with_stage("extracting"))
        .await
        .unwrap();
    store
        .update_progress(job_id, ProgressUpdate::advance(1))
        .await
        .unwrap();
    store
        .append_error(job_id, "document 1 chunk 0: extraction call failed")
        .await
        .unwrap();
    store.finish(job_id, json!({"classes": 2})).await.unwrap();

    let report = store.status(job_id).await.unwrap();
    assert_eq!(report.status, JobStatus::Finished);
    assert_eq!(report.result, Some(json!({"classes": 2})));
    assert_eq!(report.errors.len(), 1);

    let progress = report.progress.unwrap();
    assert_eq!(progress.total_units, Some(3));
    assert_eq!(progress.completed_units, 1);
    assert_eq!(progress.stage.as_deref(), Some("extracting"));
}

#[tokio::test]
#[ignore = "requires a live Postgres instance"]
async fn test_claim_single_winner_under_contention() {
    let store = open_store().await;
    let job_id = store
        .create("pg_contract_race", json!({}))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.claim(Some("pg_contract_race")).await.unwrap()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if let Some(job) = task.await.unwrap() {
            assert_eq!(job.id, job_id);
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
#[ignore = "requires a live Postgres instance"]
async fn test_claim_by_id_lost_and_fail_dedup() {
    let store = open_store().await;
    let job_id = store.create("pg_contract_claim_by_id", json!({})).await.unwrap();

    store.claim_by_id(job_id).await.unwrap();
    assert!(store.claim_by_id(job_id).await.is_err());

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
}

#[tokio::test]
#[ignore = "requires a live Postgres instance"]
async fn test_recover_stale_covers_running_jobs() {
    let store = open_store().await;
    let job_id = store.create("pg_contract_recovery", json!({})).await.unwrap();
    store.claim_by_id(job_id).await.unwrap();

    // other suites may have left running jobs of their own in a shared
    // database, so only lower-bound the count
    let recovered = store.recover_stale(None).await.unwrap();
    assert!(recovered >= 1);

    let job = store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.errors.is_empty());

    // idempotent for this job: a second pass does not duplicate the note
    let errors_before = job.errors.clone();
    store.recover_stale(None).await.unwrap();
    let job = store.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.errors, errors_before);
}

#[tokio::test]
#[ignore = "requires a live Postgres instance"]
async fn test_progress_delta_updates_race_safely() {
    let store = open_store().await;
    let job_id = store.create("pg_contract_progress", json!({})).await.unwrap();
    store.claim_by_id(job_id).await.unwrap();
    store
        .update_progress(job_id, ProgressUpdate::total(20))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .update_progress(job_id, ProgressUpdate::advance(1))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let progress = store.status(job_id).await.unwrap().progress.unwrap();
    assert_eq!(progress.completed_units, 20);
}
