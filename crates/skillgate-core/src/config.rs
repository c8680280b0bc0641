//! Kernel configuration.
//!
//! Defaults are usable as-is. A TOML document may override any subset of
//! fields, and a small set of environment variables is applied last:
//!
//! | variable                        | field                 |
//! |---------------------------------|-----------------------|
//! | `SKILLGATE_WORKER_CONCURRENCY`  | `worker.concurrency`  |
//! | `SKILLGATE_SYNC_TIMEOUT_MS`     | `sync_timeout_ms`     |
//! | `SKILLGATE_BREAKER_THRESHOLD`   | `breaker.failure_threshold` |
//! | `SKILLGATE_DATABASE_URL`        | `store.database_url`  |

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use skillgate_contracts::{
    error::{GovernanceError, GovernanceResult},
    job::{BackoffKind, BackoffPolicy},
};

pub const ENV_WORKER_CONCURRENCY: &str = "SKILLGATE_WORKER_CONCURRENCY";
pub const ENV_SYNC_TIMEOUT_MS: &str = "SKILLGATE_SYNC_TIMEOUT_MS";
pub const ENV_BREAKER_THRESHOLD: &str = "SKILLGATE_BREAKER_THRESHOLD";
pub const ENV_DATABASE_URL: &str = "SKILLGATE_DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
    pub breaker: BreakerConfig,
    pub approvals: ApprovalSweepConfig,
    pub saga: SagaConfig,
    pub store: StoreConfig,
    /// How long a synchronous caller waits for its job.
    pub sync_timeout_ms: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            queue: QueueConfig::default(),
            breaker: BreakerConfig::default(),
            approvals: ApprovalSweepConfig::default(),
            saga: SagaConfig::default(),
            store: StoreConfig::default(),
            sync_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum jobs executing at once.
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempts per job, including the first.
    pub default_attempts: u32,
    pub backoff: BackoffKind,
    pub backoff_delay_ms: u64,
    /// Priority given to jobs for admin-category skills. Everything else is 0.
    pub admin_priority: u8,
    /// How many finished jobs keep a queryable status.
    pub retain_completed: usize,
    pub retain_failed: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_attempts: 3,
            backoff: BackoffKind::Exponential,
            backoff_delay_ms: 2_000,
            admin_priority: 10,
            retain_completed: 100,
            retain_failed: 50,
        }
    }
}

impl QueueConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy { kind: self.backoff, delay_ms: self.backoff_delay_ms }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    /// While closed, one recorded failure is forgiven per interval.
    pub decay_interval_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout_ms: 60_000, decay_interval_secs: 3_600 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSweepConfig {
    /// How often pending workflows are checked against their deadline.
    pub sweep_interval_secs: u64,
}

impl Default for ApprovalSweepConfig {
    fn default() -> Self {
        Self { sweep_interval_secs: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self { base_backoff_ms: 1_000, max_backoff_ms: 30_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite URL of the durable job store. Unset keeps jobs in process memory.
    pub database_url: Option<String>,
}

impl KernelConfig {
    /// Parse a TOML document. Missing fields keep their defaults.
    pub fn from_toml_str(toml_str: &str) -> GovernanceResult<Self> {
        let config: KernelConfig = toml::from_str(toml_str)
            .map_err(|e| GovernanceError::ConfigError { reason: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> GovernanceResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GovernanceError::ConfigError {
            reason: format!("cannot read config file {}: {e}", path.display()),
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> GovernanceResult<()> {
        self.apply_overrides_from(read_env)
    }

    /// Apply overrides using `lookup` in place of the process environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> GovernanceResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_WORKER_CONCURRENCY) {
            self.worker.concurrency = parse_num(ENV_WORKER_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_SYNC_TIMEOUT_MS) {
            self.sync_timeout_ms = parse_num(ENV_SYNC_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_BREAKER_THRESHOLD) {
            self.breaker.failure_threshold = parse_num(ENV_BREAKER_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_DATABASE_URL) {
            self.store.database_url = Some(value.trim().to_string());
        }
        self.validate()
    }

    pub fn validate(&self) -> GovernanceResult<()> {
        if self.worker.concurrency == 0 {
            return Err(config_error("worker.concurrency must be at least 1"));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(config_error("breaker.failure_threshold must be at least 1"));
        }
        if self.queue.default_attempts == 0 {
            return Err(config_error("queue.default_attempts must be at least 1"));
        }
        if self.saga.base_backoff_ms > self.saga.max_backoff_ms {
            return Err(config_error("saga.base_backoff_ms exceeds saga.max_backoff_ms"));
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

fn config_error(reason: &str) -> GovernanceError {
    GovernanceError::ConfigError { reason: reason.to_string() }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> GovernanceResult<T> {
    value.trim().parse::<T>().map_err(|_| GovernanceError::ConfigError {
        reason: format!("invalid value '{value}' for {key}"),
    })
}
