//! Job store — status transitions on the `search_jobs` table.
//!
//! The table is owned by the API tier; the worker only drives the
//! pending → processing → completed/failed lifecycle. Persistence failures
//! are reported to callers but must never take down the client stream.

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;

use trawler_common::types::JobStatus;

#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bind the task id and enter `processing`.
    pub async fn mark_processing(&self, job_id: &str, task_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE search_jobs
             SET status = $2, celery_task_id = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.as_str())
        .bind(task_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal success: store the result payload as a JSON string.
    pub async fn mark_completed(&self, job_id: &str, result_json: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE search_jobs
             SET status = $2, result = $3, completed_at = $4, updated_at = $4
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.as_str())
        .bind(result_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal failure after retries exhausted.
    pub async fn mark_failed(&self, job_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE search_jobs
             SET status = $2, error = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fail jobs stuck in `processing` longer than `stale_after`. Covers
    /// cancelled runs (which leave status untouched) and workers that died
    /// mid-task. Returns the number of jobs reaped.
    pub async fn fail_stale_processing(&self, stale_after: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - stale_after;
        let result = sqlx::query(
            "UPDATE search_jobs
             SET status = $1, error = $2, updated_at = $3
             WHERE status = $4 AND updated_at < $5",
        )
        .bind(JobStatus::Failed.as_str())
        .bind("abandoned: no progress past deadline")
        .bind(Utc::now())
        .bind(JobStatus::Processing.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
