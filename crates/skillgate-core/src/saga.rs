//! Sequential multi-step execution with reverse-order compensation.
//!
//! Steps run strictly in declaration order. A step's result is merged into
//! the saga context under the step's name before the next step runs. When a
//! step fails for good, every completed step is compensated newest first;
//! compensation is best-effort and a failing compensation does not stop the
//! rest of the rollback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use skillgate_contracts::{
    error::{GovernanceError, GovernanceResult},
    execution::AuditEntry,
};

use crate::config::SagaConfig;
use crate::traits::SagaAction;

/// One registered step of a saga.
#[derive(Clone)]
pub struct SagaStep {
    pub id: String,
    /// Key under which this step's result is merged into the saga context.
    pub name: String,
    pub action: Arc<dyn SagaAction>,
    pub retryable: bool,
    /// Extra attempts after the first, when `retryable`.
    pub max_retries: u32,
}

impl SagaStep {
    /// A non-retryable step.
    pub fn new(id: impl Into<String>, name: impl Into<String>, action: Arc<dyn SagaAction>) -> Self {
        Self { id: id.into(), name: name.into(), action, retryable: false, max_retries: 0 }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retryable = true;
        self.max_retries = max_retries;
        self
    }

    fn max_attempts(&self) -> u32 {
        if self.retryable {
            self.max_retries.saturating_add(1)
        } else {
            1
        }
    }
}

/// What a saga run produced.
#[derive(Debug)]
pub struct SagaReport {
    /// The final context on success, or `SagaExecutionFailed` naming the step.
    pub outcome: GovernanceResult<Map<String, Value>>,
    pub audit_trail: Vec<AuditEntry>,
    /// Names of compensated steps, in the order compensation ran.
    pub compensated: Vec<String>,
}

pub struct SagaOrchestrator {
    base_backoff: Duration,
    max_backoff: Duration,
}

impl SagaOrchestrator {
    pub fn new(config: &SagaConfig) -> Self {
        Self {
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before the retry that follows the `attempt`-th failure (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        self.base_backoff.saturating_mul(1u32 << exp).min(self.max_backoff)
    }

    /// Run `steps` against `initial` extended with `transactionId`.
    pub async fn run(
        &self,
        saga_id: &str,
        steps: &[SagaStep],
        initial: Map<String, Value>,
        transaction_id: &str,
    ) -> SagaReport {
        let mut context = initial;
        context.insert("transactionId".to_string(), Value::String(transaction_id.to_string()));

        let mut completed: Vec<(&SagaStep, Value)> = Vec::with_capacity(steps.len());
        let mut audit_trail = Vec::new();

        for step in steps {
            info!(saga_id = %saga_id, step = %step.name, "executing saga step");

            match self.execute_with_retry(step, &context).await {
                Ok(result) => {
                    audit_trail.push(AuditEntry::new(
                        format!("saga_step_{}_completed", completed.len() + 1),
                        json!({ "stepName": step.name, "stepId": step.id }),
                    ));
                    context.insert(step.name.clone(), result.clone());
                    completed.push((step, result));
                }
                Err(err) => {
                    warn!(saga_id = %saga_id, step = %step.name, error = %err, "saga step failed");
                    let compensated = self.compensate(saga_id, &completed, &mut audit_trail).await;

                    let failure = GovernanceError::SagaExecutionFailed {
                        step: step.name.clone(),
                        reason: err.to_string(),
                    };
                    audit_trail.push(AuditEntry::new(
                        "saga_failed",
                        json!({ "step": step.name, "error": failure.to_string() }),
                    ));
                    return SagaReport { outcome: Err(failure), audit_trail, compensated };
                }
            }
        }

        SagaReport { outcome: Ok(context), audit_trail, compensated: Vec::new() }
    }

    async fn execute_with_retry(
        &self,
        step: &SagaStep,
        context: &Map<String, Value>,
    ) -> GovernanceResult<Value> {
        let max_attempts = step.max_attempts();
        let mut attempt = 1;
        loop {
            match step.action.execute(context).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt < max_attempts => {
                    let delay = self.backoff_for(attempt);
                    attempt += 1;
                    warn!(
                        step = %step.name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying saga step"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn compensate(
        &self,
        saga_id: &str,
        completed: &[(&SagaStep, Value)],
        audit_trail: &mut Vec<AuditEntry>,
    ) -> Vec<String> {
        info!(saga_id = %saga_id, steps = completed.len(), "compensating completed saga steps");

        let mut compensated = Vec::with_capacity(completed.len());
        for (step, result) in completed.iter().rev() {
            match step.action.compensate(result).await {
                Ok(()) => {
                    debug!(saga_id = %saga_id, step = %step.name, "step compensated");
                    audit_trail.push(AuditEntry::new(
                        "saga_step_compensated",
                        json!({ "stepName": step.name, "stepId": step.id }),
                    ));
                }
                Err(err) => {
                    warn!(saga_id = %saga_id, step = %step.name, error = %err, "compensation failed");
                    audit_trail.push(AuditEntry::new(
                        "saga_compensation_failed",
                        json!({ "stepName": step.name, "error": err.to_string() }),
                    ));
                }
            }
            compensated.push(step.name.clone());
        }
        compensated
    }
}
