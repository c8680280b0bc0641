//! Statistics and health reporting.

use serde::{Deserialize, Serialize};

use crate::{breaker::CircuitBreakerSnapshot, policy::PolicyStatistics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelStatistics {
    pub registered_skills: usize,
    pub registered_sagas: usize,
    /// Jobs waiting in the queue (including those sleeping before a retry).
    pub pending_jobs: usize,
    pub running_jobs: usize,
    pub worker_concurrency: usize,
    pub circuit_breakers: Vec<CircuitBreakerSnapshot>,
    pub policies: PolicyStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    /// The dispatcher is running and accepting jobs.
    pub running: bool,
    pub skills_registered: bool,
    pub policies_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

impl HealthReport {
    pub fn from_checks(checks: HealthChecks) -> Self {
        let ok = checks.running && checks.skills_registered && checks.policies_loaded;
        Self {
            status: if ok { HealthStatus::Healthy } else { HealthStatus::Degraded },
            checks,
        }
    }
}
