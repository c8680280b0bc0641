//! Queued units of admitted work.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;

/// Unique identifier of a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Delay between job attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub kind: BackoffKind,
    pub delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { kind: BackoffKind::Exponential, delay_ms: 2_000 }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match self.kind {
            BackoffKind::Fixed => self.delay_ms,
            BackoffKind::Exponential => {
                let exp = attempt.saturating_sub(1).min(20);
                self.delay_ms.saturating_mul(1u64 << exp)
            }
        };
        Duration::from_millis(ms)
    }
}

/// An admitted skill invocation waiting for (or undergoing) execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub skill_id: String,
    pub skill_name: String,
    pub input: Value,
    /// Carries the resolved transaction id.
    pub context: ExecutionContext,
    /// Higher runs first; FIFO within one priority.
    pub priority: u8,
    /// Maximum number of attempts, including the first.
    pub attempts: u32,
    /// Attempts already made.
    pub attempts_made: u32,
    pub backoff: BackoffPolicy,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn transaction_id(&self) -> &str {
        self.context.transaction_id.as_deref().unwrap_or_default()
    }
}

/// Lifecycle of a job as seen through `job_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running { attempt: u32 },
    Completed { finished_at: DateTime<Utc> },
    Failed { finished_at: DateTime<Utc>, error: String },
    /// Never seen, or evicted by the retention policy.
    Unknown,
}

impl JobStatus {
    /// Completed or failed. `Unknown` is not terminal: the job may never have existed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}
