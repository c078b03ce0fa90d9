//! PostgreSQL-backed job store.
//!
//! The claim is one conditional `UPDATE` whose row is selected `FOR UPDATE
//! SKIP LOCKED`, so concurrent claimants never block each other and exactly
//! one wins a given job. Progress counters advance with
//! `completed_units = completed_units + $n`, never an absolute set.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use specmap_core::{
    dedup_error_lines, defaults, Error, Job, JobProgress, JobStatus, JobStatusReport, JobStore,
    ProgressUpdate, Result,
};

const JOB_COLUMNS: &str = "id, job_type, status, input, result, errors, \
                           created_at, started_at, updated_at, finished_at";

const SCHEMA_STATEMENTS: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        job_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        input JSONB NOT NULL DEFAULT 'null'::jsonb,
        result JSONB,
        errors JSONB NOT NULL DEFAULT '[]'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        started_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL,
        finished_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS jobs_claim_idx
        ON jobs (status, job_type, created_at)",
    "CREATE TABLE IF NOT EXISTS job_progress (
        job_id UUID PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
        stage TEXT,
        message TEXT,
        total_units BIGINT,
        completed_units BIGINT NOT NULL DEFAULT 0
    )",
];

/// PostgreSQL implementation of `JobStore`.
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Connect to the given database URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(Error::Database)?;
        Ok(Self::new(pool))
    }

    /// Create the jobs tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        let status: String = row.get("status");
        let errors: JsonValue = row.get("errors");
        Ok(Job {
            id: row.get("id"),
            job_type: row.get("job_type"),
            status: JobStatus::parse(&status).unwrap_or(JobStatus::Queued), // fallback
            input: row.get("input"),
            result: row.get("result"),
            errors: serde_json::from_value(errors)?,
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            updated_at: row.get("updated_at"),
            finished_at: row.get("finished_at"),
        })
    }

    /// Distinguish "unknown id" from "illegal transition" after a guarded
    /// update matched no row.
    async fn transition_rejected(&self, job_id: Uuid, wanted: JobStatus) -> Error {
        match self.current_status(job_id).await {
            Ok(Some(state)) => Error::Internal(format!(
                "cannot move job {} from state {} to {}",
                job_id,
                state.as_str(),
                wanted.as_str()
            )),
            Ok(None) => Error::JobNotFound(job_id),
            Err(error) => error,
        }
    }

    async fn current_status(&self, job_id: Uuid) -> Result<Option<JobStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(status.and_then(|s| JobStatus::parse(&s)))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job_type: &str, input: JsonValue) -> Result<Uuid> {
        let job_id = Uuid::now_v7();
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        sqlx::query(
            "INSERT INTO jobs (id, job_type, status, input, errors, created_at, updated_at)
             VALUES ($1, $2, 'queued', $3, '[]'::jsonb, $4, $4)",
        )
        .bind(job_id)
        .bind(job_type)
        .bind(&input)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("INSERT INTO job_progress (job_id, completed_units) VALUES ($1, 0)")
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(%job_id, job_type, "queued job");
        Ok(job_id)
    }

    async fn claim(&self, job_type: Option<&str>) -> Result<Option<Job>> {
        let now = Utc::now();

        // FOR UPDATE SKIP LOCKED keeps concurrent claimants from blocking
        // on each other; the WHERE status guard makes the claim single-winner.
        let query = format!(
            "UPDATE jobs
             SET status = 'running', started_at = $1, updated_at = $1
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'queued'
                   AND ($2::text IS NULL OR job_type = $2)
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(now)
            .bind(job_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => {
                let job = Self::parse_job_row(row)?;
                info!(job_id = %job.id, job_type = %job.job_type, "claimed job");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn claim_by_id(&self, job_id: Uuid) -> Result<Job> {
        let now = Utc::now();
        let query = format!(
            "UPDATE jobs
             SET status = 'running', started_at = $2, updated_at = $2
             WHERE id = $1 AND status = 'queued'
             RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(job_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Self::parse_job_row(row),
            None => match self.current_status(job_id).await? {
                Some(_) => Err(Error::ClaimLost(job_id)),
                None => Err(Error::JobNotFound(job_id)),
            },
        }
    }

    async fn finish(&self, job_id: Uuid, result: JsonValue) -> Result<()> {
        let now = Utc::now();
        let outcome = sqlx::query(
            "UPDATE jobs
             SET status = 'finished', result = $2, updated_at = $3, finished_at = $3
             WHERE id = $1 AND status = 'running'",
        )
        .bind(job_id)
        .bind(&result)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if outcome.rows_affected() == 0 {
            return Err(self.transition_rejected(job_id, JobStatus::Finished).await);
        }
        info!(%job_id, "job finished");
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, errors: &[String]) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let row = sqlx::query(
            "SELECT errors FROM jobs WHERE id = $1 AND status = 'running' FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            drop(tx);
            return Err(self.transition_rejected(job_id, JobStatus::Failed).await);
        };

        let mut lines: Vec<String> = serde_json::from_value(row.get("errors"))?;
        for line in dedup_error_lines(errors) {
            if !lines.contains(&line) {
                lines.push(line);
            }
        }

        sqlx::query(
            "UPDATE jobs
             SET status = 'failed', errors = $2, updated_at = $3, finished_at = $3
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(serde_json::to_value(&lines)?)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;

        warn!(%job_id, error_count = errors.len(), "job failed");
        Ok(())
    }

    async fn append_error(&self, job_id: Uuid, message: &str) -> Result<()> {
        let outcome = sqlx::query(
            "UPDATE jobs SET errors = errors || to_jsonb($2::text), updated_at = $3
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if outcome.rows_affected() == 0 {
            return Err(Error::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, update: ProgressUpdate) -> Result<()> {
        // advisory: a write that matches no row is silently ignored
        sqlx::query(
            "UPDATE job_progress
             SET stage = COALESCE($2, stage),
                 message = COALESCE($3, message),
                 total_units = COALESCE($4, total_units),
                 completed_units = completed_units + $5
             WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(update.stage)
        .bind(update.message)
        .bind(update.total_units.map(|units| units as i64))
        .bind(update.advance_units as i64)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(Self::parse_job_row).transpose()
    }

    async fn status(&self, job_id: Uuid) -> Result<JobStatusReport> {
        let job = self
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;

        let progress_row = sqlx::query(
            "SELECT stage, message, total_units, completed_units
             FROM job_progress WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let progress = progress_row.map(|row| JobProgress {
            job_id,
            stage: row.get("stage"),
            message: row.get("message"),
            total_units: row.get::<Option<i64>, _>("total_units").map(|v| v as u64),
            completed_units: row.get::<i64, _>("completed_units") as u64,
        });

        Ok(JobStatusReport {
            status: job.status,
            progress,
            result: job.result,
            errors: job.errors,
        })
    }

    async fn recover_stale(&self, note: Option<&str>) -> Result<usize> {
        let note = note.unwrap_or(defaults::STALE_JOB_MESSAGE);
        let now = Utc::now();

        let outcome = sqlx::query(
            "UPDATE jobs
             SET status = 'failed',
                 errors = CASE
                     WHEN errors @> to_jsonb(ARRAY[$1::text]) THEN errors
                     ELSE errors || to_jsonb($1::text)
                 END,
                 updated_at = $2,
                 finished_at = $2
             WHERE status = 'running'",
        )
        .bind(note)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let recovered = outcome.rows_affected() as usize;
        if recovered > 0 {
            info!(recovered, "recovered stale running jobs");
        }
        Ok(recovered)
    }
}
