//! The `skill_job` table.
//!
//! One row per admitted job, keyed by job id. `seq` preserves admission
//! order for recovery. The full job is kept as JSON in `job_json` and is
//! rewritten on every save, so a reloaded job carries the attempt count of
//! its last completed attempt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use skillgate_contracts::{
    error::GovernanceResult,
    job::{Job, JobId},
};
use skillgate_core::traits::JobStore;

use crate::connection::DbPool;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl StoredState {
    pub fn as_str(self) -> &'static str {
        match self {
            StoredState::Queued => "queued",
            StoredState::Running => "running",
            StoredState::Completed => "completed",
            StoredState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(StoredState::Queued),
            "running" => Some(StoredState::Running),
            "completed" => Some(StoredState::Completed),
            "failed" => Some(StoredState::Failed),
            _ => None,
        }
    }
}

/// A row as seen by operators: state plus bookkeeping, without the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredJobRecord {
    pub id: String,
    pub skill_id: String,
    pub state: StoredState,
    pub attempts_made: u32,
    pub running_attempt: Option<u32>,
    pub last_error: Option<String>,
}

pub struct SqliteJobStore {
    pool: DbPool,
}

impl SqliteJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, job_id: &JobId) -> Result<Option<StoredJobRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, skill_id, state, attempts_made, running_attempt, last_error
             FROM skill_job
             WHERE id = ?",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// Delete finished rows last updated before `cutoff`. Returns how many went.
    pub async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM skill_job
             WHERE state IN ('completed', 'failed') AND updated_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let job_json = serde_json::to_string(job)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO skill_job (
                id,
                skill_id,
                priority,
                state,
                attempts_made,
                running_attempt,
                job_json,
                last_error,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, NULL, ?, NULL, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                attempts_made = excluded.attempts_made,
                running_attempt = NULL,
                job_json = excluded.job_json,
                updated_at = excluded.updated_at",
        )
        .bind(job.id.to_string())
        .bind(&job.skill_id)
        .bind(i64::from(job.priority))
        .bind(StoredState::Queued.as_str())
        .bind(i64::from(job.attempts_made))
        .bind(job_json)
        .bind(job.created_at.to_rfc3339())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_running(&self, job_id: &JobId, attempt: u32) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE skill_job
             SET state = ?, running_attempt = ?, updated_at = ?
             WHERE id = ? AND state IN ('queued', 'running')",
        )
        .bind(StoredState::Running.as_str())
        .bind(i64::from(attempt))
        .bind(Utc::now().to_rfc3339())
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_finished(&self, job_id: &JobId, error: Option<&str>) -> Result<(), StoreError> {
        let state = if error.is_some() { StoredState::Failed } else { StoredState::Completed };
        sqlx::query(
            "UPDATE skill_job
             SET state = ?, running_attempt = NULL, last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unfinished(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(
            "SELECT job_json
             FROM skill_job
             WHERE state IN ('queued', 'running')
             ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let jobs = rows.into_iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
        debug!(count = jobs.len(), "loaded unfinished jobs");
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, job: &Job) -> GovernanceResult<()> {
        Ok(self.save_job(job).await?)
    }

    async fn mark_running(&self, job_id: &JobId, attempt: u32) -> GovernanceResult<()> {
        Ok(self.set_running(job_id, attempt).await?)
    }

    async fn finish(&self, job_id: &JobId, error: Option<&str>) -> GovernanceResult<()> {
        Ok(self.set_finished(job_id, error).await?)
    }

    async fn load_unfinished(&self) -> GovernanceResult<Vec<Job>> {
        Ok(self.unfinished().await?)
    }
}

fn job_from_row(row: SqliteRow) -> Result<Job, StoreError> {
    let job_json: String = row.try_get("job_json")?;
    Ok(serde_json::from_str(&job_json)?)
}

fn record_from_row(row: SqliteRow) -> Result<StoredJobRecord, StoreError> {
    let state_raw = row.try_get::<String, _>("state")?;
    let state = StoredState::parse(&state_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown job state `{state_raw}`")))?;

    Ok(StoredJobRecord {
        id: row.try_get("id")?,
        skill_id: row.try_get("skill_id")?,
        state,
        attempts_made: parse_u32("attempts_made", row.try_get("attempts_made")?)?,
        running_attempt: row
            .try_get::<Option<i64>, _>("running_attempt")?
            .map(|value| parse_u32("running_attempt", value))
            .transpose()?,
        last_error: row.try_get("last_error")?,
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| {
        StoreError::Decode(format!("invalid value for `{column}` (expected non-negative u32): {value}"))
    })
}
