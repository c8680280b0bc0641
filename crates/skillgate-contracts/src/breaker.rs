//! Circuit-breaker state and reporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast until `next_attempt`.
    Open,
    /// Recovery trial: the next outcome decides between closed and open.
    HalfOpen,
}

/// Point-in-time view of one skill's breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerSnapshot {
    pub skill_id: String,
    pub state: CircuitState,
    pub failures: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    #[serde(default)]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_attempt: Option<DateTime<Utc>>,
}
