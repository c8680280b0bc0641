//! Error taxonomy for the skillgate runtime.
//!
//! All fallible operations return `GovernanceResult<T>`. Variants carry enough
//! context to produce an actionable `ExecutionFailure` and audit entry, and
//! each maps to a stable machine code via [`GovernanceError::code`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of the executor a schema check guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Input,
    Output,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStage::Input => f.write_str("input"),
            ValidationStage::Output => f.write_str("output"),
        }
    }
}

/// The unified error type for the skillgate runtime.
#[derive(Debug, Clone, Error)]
pub enum GovernanceError {
    /// No skill (or no executor) is registered under this id. Not retryable.
    #[error("skill not found: {skill_id}")]
    SkillNotFound { skill_id: String },

    #[error("saga not found: {saga_id}")]
    SagaNotFound { saga_id: String },

    /// A `deny` rule matched. Terminal for this request.
    #[error("policy '{policy_id}' denied action '{action}': {reason}")]
    PolicyViolation { policy_id: String, action: String, reason: String },

    /// A `require_approval` rule matched. A control-flow signal rather than
    /// a fault: the caller tracks `workflow_id` and resumes after sign-off.
    #[error("approval required (workflow {workflow_id}): {reason}")]
    ApprovalRequired { workflow_id: String, reason: String },

    /// Input or output did not satisfy the skill's declared schema.
    #[error("{stage} validation failed for skill {skill_id}: {reason}")]
    Validation { skill_id: String, stage: ValidationStage, reason: String },

    /// The skill's breaker is open. Transient; the caller may retry later.
    #[error("circuit breaker is open for skill {skill_id}")]
    CircuitBreakerOpen { skill_id: String },

    /// A synchronous wait gave up. The job itself may still complete.
    #[error("job execution timeout after {timeout_ms}ms (job {job_id})")]
    ExecutionTimeout { job_id: String, timeout_ms: u64 },

    #[error("saga failed at step {step}: {reason}")]
    SagaExecutionFailed { step: String, reason: String },

    /// A skill executor or saga action reported a business failure.
    #[error("execution of {skill_id} failed: {reason}")]
    Execution { skill_id: String, reason: String },

    #[error("approval workflow {workflow_id} not found")]
    WorkflowNotFound { workflow_id: String },

    /// The submitted step is not the workflow's current step.
    #[error("invalid step {step_id} for workflow {workflow_id}")]
    InvalidApprovalStep { workflow_id: String, step_id: String },

    #[error("approval workflow {workflow_id} is not pending")]
    WorkflowNotPending { workflow_id: String },

    /// Resume was requested for a workflow that is not approved, or was already resumed.
    #[error("approval workflow {workflow_id} cannot be resumed: {reason}")]
    WorkflowNotApproved { workflow_id: String, reason: String },

    /// The job queue is draining or closed.
    #[error("job queue is closed")]
    QueueClosed,

    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The schema document itself could not be compiled.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },

    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// The durable job store could not be read or written.
    #[error("job store failed: {reason}")]
    JobStoreFailed { reason: String },
}

impl GovernanceError {
    /// Shorthand for executors reporting a business failure.
    pub fn execution(skill_id: impl Into<String>, reason: impl Into<String>) -> Self {
        GovernanceError::Execution { skill_id: skill_id.into(), reason: reason.into() }
    }

    /// Stable, upper-snake-case code surfaced in `ExecutionFailure::code`.
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::SkillNotFound { .. } => "SKILL_NOT_FOUND",
            GovernanceError::SagaNotFound { .. } => "SAGA_NOT_FOUND",
            GovernanceError::PolicyViolation { .. } => "POLICY_VIOLATION",
            GovernanceError::ApprovalRequired { .. } => "APPROVAL_REQUIRED",
            GovernanceError::Validation { .. } => "VALIDATION_ERROR",
            GovernanceError::CircuitBreakerOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            GovernanceError::ExecutionTimeout { .. } => "EXECUTION_TIMEOUT",
            GovernanceError::SagaExecutionFailed { .. } => "SAGA_EXECUTION_FAILED",
            GovernanceError::Execution { .. } => "EXECUTION_FAILED",
            GovernanceError::WorkflowNotFound { .. } => "WORKFLOW_NOT_FOUND",
            GovernanceError::InvalidApprovalStep { .. } => "INVALID_APPROVAL_STEP",
            GovernanceError::WorkflowNotPending { .. } => "WORKFLOW_NOT_PENDING",
            GovernanceError::WorkflowNotApproved { .. } => "WORKFLOW_NOT_APPROVED",
            GovernanceError::QueueClosed => "QUEUE_CLOSED",
            GovernanceError::ConfigError { .. } => "CONFIG_ERROR",
            GovernanceError::SchemaValidation { .. } => "SCHEMA_VALIDATION",
            GovernanceError::AuditWriteFailed { .. } => "AUDIT_WRITE_FAILED",
            GovernanceError::JobStoreFailed { .. } => "JOB_STORE_FAILED",
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// The worker pool re-queues retryable job failures; the kernel never
    /// retries admission failures on the caller's behalf.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GovernanceError::Execution { .. }
                | GovernanceError::CircuitBreakerOpen { .. }
                | GovernanceError::ExecutionTimeout { .. }
        )
    }
}

/// Convenience alias used throughout the skillgate crates.
pub type GovernanceResult<T> = Result<T, GovernanceError>;
