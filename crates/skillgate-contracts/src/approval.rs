//! Human-approval workflow types.
//!
//! A workflow is created when a `require_approval` rule fires and is then
//! advanced by explicit `process_approval` calls. It is a persisted state
//! machine, not a suspended task:
//!
//! ```text
//! pending ──approve (more steps)──▶ pending (current_step + 1)
//! pending ──approve (last step)───▶ approved
//! pending ──reject────────────────▶ rejected
//! pending ──deadline passed───────▶ expired
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;

/// State of a single approval step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Waiting,
    Approved,
    Rejected,
    Expired,
}

/// State of the whole workflow. Everything but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkflowStatus::Pending)
    }
}

/// One sign-off required from a given role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub step_id: String,
    pub approver_role: String,
    /// Identity of whoever resolved the step.
    #[serde(default)]
    pub approver_user: Option<String>,
    pub timeout_minutes: u32,
    pub status: StepStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// The request that triggered the workflow, captured verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    pub action: String,
    pub input: Value,
    pub context: ExecutionContext,
    /// In `[0, 1]`.
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTimeline {
    pub initiated: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
}

/// A multi-step human approval process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalWorkflow {
    pub workflow_id: String,
    /// User id of the caller whose request is waiting.
    pub initiator: String,
    pub skill_id: String,
    pub request_details: RequestDetails,
    pub steps: Vec<ApprovalStep>,
    pub current_step: usize,
    pub status: WorkflowStatus,
    pub timeline: WorkflowTimeline,
    /// Rule that demanded the approval.
    pub policy_id: String,
    pub reason: String,
    /// Set once an approved request has been handed back to the kernel.
    #[serde(default)]
    pub resumed_at: Option<DateTime<Utc>>,
}

impl ApprovalWorkflow {
    pub fn current(&self) -> Option<&ApprovalStep> {
        self.steps.get(self.current_step)
    }
}

/// Result of resolving one approval step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    /// The workflow reached a terminal state.
    pub completed: bool,
    /// The step (and, if `completed`, the workflow) was approved.
    pub approved: bool,
}
