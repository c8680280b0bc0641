//! Wiring shared by every scenario.
//!
//! `ReferenceRuntime` owns a started kernel together with inspectable
//! handles to the policy engine and audit sink the kernel was given. When
//! `store.database_url` is set, admitted jobs are kept in SQLite.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use skillgate_audit::InMemoryAuditSink;
use skillgate_contracts::{
    error::GovernanceResult,
    execution::ExecutionResult,
    job::{JobId, JobStatus},
};
use skillgate_core::{ExecutionKernel, KernelConfig};
use skillgate_policy::RulePolicyEngine;
use skillgate_store::SqliteJobStore;
use skillgate_verify::JsonSchemaValidator;

pub struct ReferenceRuntime {
    pub kernel: ExecutionKernel,
    pub policy: Arc<RulePolicyEngine>,
    pub audit: Arc<InMemoryAuditSink>,
}

impl ReferenceRuntime {
    /// Build and start a kernel using the default policy set.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(config: KernelConfig) -> GovernanceResult<Self> {
        let policy = Arc::new(RulePolicyEngine::with_default_policies()?);
        let audit = Arc::new(InMemoryAuditSink::new());
        let database_url = config.store.database_url.clone();

        let mut kernel = ExecutionKernel::new(
            config,
            policy.clone(),
            Arc::new(JsonSchemaValidator::new()),
            audit.clone(),
        );
        if let Some(url) = database_url {
            let pool = skillgate_store::connect(&url).await?;
            kernel = kernel.with_job_store(Arc::new(SqliteJobStore::new(pool)));
            debug!(database_url = %url, "durable job store attached");
        }
        kernel.start();
        debug!(policies = policy.policies().len(), "reference runtime started");

        Ok(Self { kernel, policy, audit })
    }

    pub async fn shutdown(&self) {
        self.kernel.shutdown().await;
    }

    /// Poll until the job reaches a terminal state or `limit` elapses.
    pub async fn wait_for_job(&self, job_id: &JobId, limit: Duration) -> JobStatus {
        let deadline = Instant::now() + limit;
        loop {
            let status = self.kernel.job_status(job_id);
            if status.is_terminal() || Instant::now() >= deadline {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// The job id an asynchronous execution returned, if any.
pub fn queued_job_id(result: &ExecutionResult) -> Option<JobId> {
    result.result.as_ref()?.get("jobId")?.as_str()?.parse().ok()
}

/// Kernel settings tuned for the scenarios.
pub const DEMO_CONFIG: &str = include_str!("../config/demo.toml");

pub fn demo_config() -> GovernanceResult<KernelConfig> {
    KernelConfig::from_toml_str(DEMO_CONFIG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_config_parses() {
        let config = demo_config().unwrap();
        assert_eq!(config.queue.default_attempts, 1);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.decay_interval_secs, 3600);
    }
}
