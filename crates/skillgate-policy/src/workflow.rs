//! Storage and state transitions for approval workflows.
//!
//! Workflows are plain records advanced by explicit calls. Nothing here
//! waits: an approver's decision arrives through `process_at`, and expiry
//! happens when the periodic sweep calls `expire_at`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use skillgate_contracts::{
    approval::{
        ApprovalOutcome, ApprovalStep, ApprovalWorkflow, RequestDetails, StepStatus, WorkflowStatus,
        WorkflowTimeline,
    },
    context::ExecutionContext,
    error::{GovernanceError, GovernanceResult},
    skill::Skill,
};

/// Everything needed to open a workflow for one blocked request.
pub struct ApprovalRequest<'a> {
    pub skill: &'a Skill,
    pub context: &'a ExecutionContext,
    pub input: &'a Value,
    pub policy_id: &'a str,
    pub reason: &'a str,
    pub approver_role: &'a str,
    pub timeout_minutes: u32,
    pub risk_score: f64,
}

/// Build a pending single-step workflow for `request`.
pub fn open_workflow(request: ApprovalRequest<'_>, now: DateTime<Utc>) -> ApprovalWorkflow {
    let step = ApprovalStep {
        step_id: Uuid::new_v4().to_string(),
        approver_role: request.approver_role.to_string(),
        approver_user: None,
        timeout_minutes: request.timeout_minutes,
        status: StepStatus::Waiting,
        completed_at: None,
        rationale: None,
    };

    ApprovalWorkflow {
        workflow_id: Uuid::new_v4().to_string(),
        initiator: request.context.user_id.clone(),
        skill_id: request.skill.id.clone(),
        request_details: RequestDetails {
            action: request.skill.id.clone(),
            input: request.input.clone(),
            context: request.context.clone(),
            risk_score: request.risk_score,
        },
        timeline: WorkflowTimeline {
            initiated: now,
            deadline: deadline_for(&[&step], now),
            completed: None,
        },
        steps: vec![step],
        current_step: 0,
        status: WorkflowStatus::Pending,
        policy_id: request.policy_id.to_string(),
        reason: request.reason.to_string(),
        resumed_at: None,
    }
}

/// The whole workflow must finish within the sum of its step timeouts.
fn deadline_for(steps: &[&ApprovalStep], now: DateTime<Utc>) -> DateTime<Utc> {
    let minutes: i64 = steps.iter().map(|s| i64::from(s.timeout_minutes)).sum();
    now + Duration::minutes(minutes)
}

/// Thread-safe map of workflow id to workflow.
#[derive(Debug, Default)]
pub struct ApprovalWorkflowManager {
    workflows: Mutex<HashMap<String, ApprovalWorkflow>>,
}

impl ApprovalWorkflowManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, ApprovalWorkflow>> {
        self.workflows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `workflow` and return its id.
    pub fn insert(&self, workflow: ApprovalWorkflow) -> String {
        let id = workflow.workflow_id.clone();
        self.map().insert(id.clone(), workflow);
        id
    }

    pub fn get(&self, workflow_id: &str) -> Option<ApprovalWorkflow> {
        self.map().get(workflow_id).cloned()
    }

    /// Resolve the current step of a pending workflow.
    ///
    /// A step id that is not the current step's id is rejected before any
    /// field is touched.
    pub fn process_at(
        &self,
        workflow_id: &str,
        step_id: &str,
        approved: bool,
        approver: &str,
        rationale: Option<&str>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<ApprovalOutcome> {
        let mut map = self.map();
        let workflow = map
            .get_mut(workflow_id)
            .ok_or_else(|| GovernanceError::WorkflowNotFound { workflow_id: workflow_id.to_string() })?;

        if workflow.status != WorkflowStatus::Pending {
            return Err(GovernanceError::WorkflowNotPending { workflow_id: workflow_id.to_string() });
        }

        let index = workflow.current_step;
        let step_count = workflow.steps.len();
        let step = match workflow.steps.get_mut(index) {
            Some(step) if step.step_id == step_id => step,
            _ => {
                return Err(GovernanceError::InvalidApprovalStep {
                    workflow_id: workflow_id.to_string(),
                    step_id: step_id.to_string(),
                })
            }
        };

        step.status = if approved { StepStatus::Approved } else { StepStatus::Rejected };
        step.approver_user = Some(approver.to_string());
        step.rationale = rationale.map(str::to_string);
        step.completed_at = Some(now);

        let outcome = if !approved {
            workflow.status = WorkflowStatus::Rejected;
            workflow.timeline.completed = Some(now);
            ApprovalOutcome { completed: true, approved: false }
        } else if index + 1 < step_count {
            workflow.current_step += 1;
            ApprovalOutcome { completed: false, approved: true }
        } else {
            workflow.status = WorkflowStatus::Approved;
            workflow.timeline.completed = Some(now);
            ApprovalOutcome { completed: true, approved: true }
        };

        info!(
            workflow_id = %workflow_id,
            approver = %approver,
            approved,
            status = ?workflow.status,
            "approval step resolved"
        );
        Ok(outcome)
    }

    /// Mark an approved workflow as handed back for execution.
    ///
    /// Succeeds at most once per workflow.
    pub fn claim_approved_at(&self, workflow_id: &str, now: DateTime<Utc>) -> GovernanceResult<ApprovalWorkflow> {
        let mut map = self.map();
        let workflow = map
            .get_mut(workflow_id)
            .ok_or_else(|| GovernanceError::WorkflowNotFound { workflow_id: workflow_id.to_string() })?;

        if workflow.status != WorkflowStatus::Approved {
            return Err(GovernanceError::WorkflowNotApproved {
                workflow_id: workflow_id.to_string(),
                reason: format!("status is {:?}", workflow.status).to_lowercase(),
            });
        }
        if workflow.resumed_at.is_some() {
            return Err(GovernanceError::WorkflowNotApproved {
                workflow_id: workflow_id.to_string(),
                reason: "already resumed".to_string(),
            });
        }

        workflow.resumed_at = Some(now);
        Ok(workflow.clone())
    }

    /// Undo a claim whose request never reached the queue, so it can be resumed again.
    pub fn release_claim(&self, workflow_id: &str) -> bool {
        match self.map().get_mut(workflow_id) {
            Some(workflow) if workflow.resumed_at.is_some() => {
                workflow.resumed_at = None;
                info!(workflow_id = %workflow_id, "approval claim released");
                true
            }
            _ => false,
        }
    }

    /// Expire every pending workflow whose deadline is before `now`.
    pub fn expire_at(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for workflow in self.map().values_mut() {
            if workflow.status != WorkflowStatus::Pending || workflow.timeline.deadline >= now {
                continue;
            }
            workflow.status = WorkflowStatus::Expired;
            workflow.timeline.completed = Some(now);
            let index = workflow.current_step;
            if let Some(step) = workflow.steps.get_mut(index) {
                step.status = StepStatus::Expired;
            }
            info!(workflow_id = %workflow.workflow_id, "approval workflow expired");
            expired += 1;
        }
        expired
    }

    /// (pending, expired) workflow counts.
    pub fn counts(&self) -> (usize, usize) {
        let map = self.map();
        let pending = map.values().filter(|w| w.status == WorkflowStatus::Pending).count();
        let expired = map.values().filter(|w| w.status == WorkflowStatus::Expired).count();
        (pending, expired)
    }

    /// Append a step for `approver_role` and push the deadline out accordingly.
    pub fn add_step(&self, workflow_id: &str, approver_role: &str, timeout_minutes: u32) -> GovernanceResult<String> {
        let mut map = self.map();
        let workflow = map
            .get_mut(workflow_id)
            .ok_or_else(|| GovernanceError::WorkflowNotFound { workflow_id: workflow_id.to_string() })?;
        if workflow.status != WorkflowStatus::Pending {
            return Err(GovernanceError::WorkflowNotPending { workflow_id: workflow_id.to_string() });
        }

        let step = ApprovalStep {
            step_id: Uuid::new_v4().to_string(),
            approver_role: approver_role.to_string(),
            approver_user: None,
            timeout_minutes,
            status: StepStatus::Waiting,
            completed_at: None,
            rationale: None,
        };
        let step_id = step.step_id.clone();
        workflow.steps.push(step);

        let steps: Vec<&ApprovalStep> = workflow.steps.iter().collect();
        workflow.timeline.deadline = deadline_for(&steps, workflow.timeline.initiated);
        Ok(step_id)
    }
}
