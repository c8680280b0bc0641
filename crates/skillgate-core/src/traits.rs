//! Trait seams of the skillgate runtime.
//!
//! The kernel owns the trusted pipeline and reaches every collaborator
//! through one of these traits:
//!
//! - `SkillExecutor`: untrusted skill logic, only called after admission
//! - `PolicyEngine`: trusted gate returning allow / deny / require-approval
//! - `SchemaValidator`: trusted checker for skill inputs and outputs
//! - `RateLimiter`: external rate accounting consulted during evaluation
//! - `DiagnosticSink`: where non-fatal evaluation warnings go
//! - `AuditSink`: append-only record of every audit entry
//! - `SagaAction`: one step of a compensating multi-step operation
//! - `JobStore`: durable record of admitted jobs that have not finished

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use skillgate_contracts::{
    approval::{ApprovalOutcome, ApprovalWorkflow},
    context::ExecutionContext,
    error::{GovernanceError, GovernanceResult},
    execution::AuditRecord,
    job::{Job, JobId},
    policy::{PolicyDecision, PolicyStatistics},
    skill::Skill,
    validation::ValidationReport,
};

/// The implementation behind a registered skill.
///
/// The kernel guarantees `execute` is only called after the circuit breaker
/// and the policy engine admitted the request and the input passed the
/// skill's input schema.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> GovernanceResult<Value>;
}

/// Adapts an async closure into a [`SkillExecutor`].
///
/// ```rust,ignore
/// let executor = FnExecutor::new(|input, _ctx| async move {
///     Ok(json!({ "echo": input }))
/// });
/// ```
pub struct FnExecutor<F>(F);

impl<F, Fut> FnExecutor<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = GovernanceResult<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> SkillExecutor for FnExecutor<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = GovernanceResult<Value>> + Send,
{
    async fn execute(&self, input: &Value, context: &ExecutionContext) -> GovernanceResult<Value> {
        (self.0)(input.clone(), context.clone()).await
    }
}

/// The admission gate consulted before any work is queued.
///
/// Evaluation must be fast and in-memory: it runs on the caller's path and
/// must never wait on the worker pool. A `deny` may be reported either as
/// `Err(GovernanceError::PolicyViolation)` or as a decision with
/// `allowed = false`; the kernel treats both as a denial.
pub trait PolicyEngine: Send + Sync {
    fn evaluate(
        &self,
        skill: &Skill,
        context: &ExecutionContext,
        input: &Value,
    ) -> GovernanceResult<PolicyDecision>;

    fn approval_status(&self, _workflow_id: &str) -> Option<ApprovalWorkflow> {
        None
    }

    /// Resolve the current step of a pending workflow.
    fn process_approval(
        &self,
        workflow_id: &str,
        _step_id: &str,
        _approved: bool,
        _approver: &str,
        _rationale: Option<&str>,
    ) -> GovernanceResult<ApprovalOutcome> {
        Err(GovernanceError::WorkflowNotFound { workflow_id: workflow_id.to_string() })
    }

    /// Hand an approved workflow's request back for execution, at most once.
    fn claim_approved(&self, workflow_id: &str) -> GovernanceResult<ApprovalWorkflow> {
        Err(GovernanceError::WorkflowNotFound { workflow_id: workflow_id.to_string() })
    }

    /// Return a claimed workflow to the approved state. Called when the
    /// claimed request could not be queued.
    fn release_claim(&self, _workflow_id: &str) {}

    /// Expire pending workflows whose deadline is before `now`. Returns how many expired.
    fn cleanup_expired_workflows(&self, _now: DateTime<Utc>) -> usize {
        0
    }

    fn statistics(&self) -> PolicyStatistics {
        PolicyStatistics::default()
    }
}

/// Structural validation of skill inputs and outputs.
pub trait SchemaValidator: Send + Sync {
    /// Check `instance` against the JSON Schema document `schema`.
    ///
    /// A failing report is a normal outcome; `Err` is reserved for schemas
    /// that cannot be compiled.
    fn validate(&self, schema: &Value, instance: &Value) -> GovernanceResult<ValidationReport>;
}

/// External rate accounting. The runtime only asks whether a limit is exceeded.
pub trait RateLimiter: Send + Sync {
    fn is_exceeded(&self, context: &ExecutionContext, skill: &Skill) -> bool;
}

/// A rate limiter that never reports an exceeded limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn is_exceeded(&self, _context: &ExecutionContext, _skill: &Skill) -> bool {
        false
    }
}

/// Receives non-fatal warnings raised while evaluating policy.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, message: &str);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn warn(&self, message: &str) {
        warn!(diagnostic = %message, "policy evaluation warning");
    }
}

/// The append-only audit record.
///
/// Every audit entry the kernel adds to an `ExecutionResult` is also passed
/// here. Implementations must treat `record` as append-only.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> GovernanceResult<()>;
}

/// An audit sink that only emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> GovernanceResult<()> {
        debug!(
            transaction_id = %record.transaction_id,
            subject = %record.subject,
            event = %record.entry.event,
            "audit"
        );
        Ok(())
    }
}

/// One step of a saga.
///
/// `execute` receives the saga's accumulated context: the initial context,
/// the transaction id, and the result of every earlier step under that step's
/// name. `compensate` receives this step's own result and must undo it.
#[async_trait]
pub trait SagaAction: Send + Sync {
    async fn execute(&self, context: &Map<String, Value>) -> GovernanceResult<Value>;

    async fn compensate(&self, result: &Value) -> GovernanceResult<()>;
}

/// Durable record of admitted jobs.
///
/// The queue writes through this store before a job becomes visible to the
/// dispatcher, so an admitted job survives a restart. On `start` every job
/// the store still holds as unfinished is queued again. A job that was
/// running when the process stopped is re-run from the attempt count it was
/// saved with; executors must tolerate being called again for such a job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist `job` as queued. Called on enqueue and before every retry.
    async fn save(&self, job: &Job) -> GovernanceResult<()>;

    async fn mark_running(&self, job_id: &JobId, attempt: u32) -> GovernanceResult<()>;

    /// Record the terminal outcome. `error` is `None` on success.
    async fn finish(&self, job_id: &JobId, error: Option<&str>) -> GovernanceResult<()>;

    /// Every queued or running job, oldest first.
    async fn load_unfinished(&self) -> GovernanceResult<Vec<Job>>;
}
