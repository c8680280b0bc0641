//! Caller-facing execution results and audit entries.
//!
//! Every outcome the kernel produces, whether success, denial, pending
//! approval or timeout, is an `ExecutionResult` carrying an audit trail.
//! `AuditRecord` is what gets handed to the configured audit sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GovernanceError;

/// One event in an execution's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Snake-case event name, e.g. `job_queued`, `saga_step_2_completed`.
    pub event: String,
    pub details: Value,
}

impl AuditEntry {
    pub fn new(event: impl Into<String>, details: Value) -> Self {
        Self { timestamp: Utc::now(), event: event.into(), details }
    }
}

/// An audit entry together with the identifiers needed to correlate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub transaction_id: String,
    /// Skill or saga the entry belongs to.
    pub subject: String,
    pub entry: AuditEntry,
}

/// Structured description of why an execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    /// Stable machine code, see [`GovernanceError::code`].
    pub code: String,
    pub message: String,
    /// Present when the failure is a pending approval the caller must track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Present for policy denials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
}

impl From<&GovernanceError> for ExecutionFailure {
    fn from(err: &GovernanceError) -> Self {
        let (workflow_id, policy_id) = match err {
            GovernanceError::ApprovalRequired { workflow_id, .. } => (Some(workflow_id.clone()), None),
            GovernanceError::PolicyViolation { policy_id, .. } => (None, Some(policy_id.clone())),
            _ => (None, None),
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            workflow_id,
            policy_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub execution_time_ms: u64,
    /// Transaction id that compensation/rollback is keyed on (sagas).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_id: Option<String>,
    pub audit_trail: Vec<AuditEntry>,
}

/// The uniformly shaped outcome of `execute_skill`, `execute_saga` and
/// `resume_approved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    pub fn succeeded(result: Value, metadata: ExecutionMetadata) -> Self {
        Self { success: true, result: Some(result), error: None, metadata }
    }

    pub fn failed(err: &GovernanceError, metadata: ExecutionMetadata) -> Self {
        Self { success: false, result: None, error: Some(err.into()), metadata }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}
