//! Scenario 2: High-Value Payment Approval
//!
//! A customer transfers NPR 60,000 to a provider. The `financial-high-value`
//! rule holds the request in an approval workflow instead of running it.
//!
//!   Step 1: payment-transfer       → APPROVAL_REQUIRED (workflow opened, ledger untouched)
//!              ↓ [admin approves]
//!   Step 2: resume_approved         → executed exactly once
//!   Step 3: resume_approved (again) → WORKFLOW_NOT_APPROVED
//!
//! Two side cases follow: a rejected transfer that can never be resumed, and
//! a workflow left unattended past its deadline that the sweep expires.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

use skillgate_contracts::{
    approval::WorkflowStatus,
    context::{ExecutionContext, UserRole},
    error::{GovernanceError, GovernanceResult},
    execution::ExecutionResult,
};
use skillgate_core::KernelConfig;

use crate::mock_data::Ledger;
use crate::runtime::ReferenceRuntime;
use crate::skills::{self, PaymentGateway, PAYMENT_TRANSFER};

const CUSTOMER: &str = "cust-305";
const APPROVER: &str = "admin-ops-1";

#[derive(Debug, Clone)]
pub struct ApprovalReport {
    pub held_code: Option<String>,
    pub workflow_id: Option<String>,
    pub charges_while_pending: usize,
    pub approved: bool,
    pub resumed: bool,
    pub transfer_status: Option<String>,
    pub second_resume_code: Option<String>,
    pub rejected_resume_code: Option<String>,
    pub expired_status: Option<WorkflowStatus>,
    pub ledger_balance: f64,
    pub audit_events: usize,
    pub audit_verified: bool,
}

fn transfer(amount: f64) -> Value {
    json!({ "amount": amount, "recipient": "prov-003" })
}

fn customer() -> ExecutionContext {
    ExecutionContext::new(CUSTOMER, UserRole::Customer).synchronous()
}

fn workflow_of(result: &ExecutionResult) -> Option<String> {
    result.error.as_ref()?.workflow_id.clone()
}

/// Approve every step of a pending workflow as `APPROVER`.
fn approve_all(runtime: &ReferenceRuntime, workflow_id: &str) -> GovernanceResult<bool> {
    loop {
        let workflow = runtime
            .kernel
            .approval_status(workflow_id)
            .ok_or_else(|| GovernanceError::WorkflowNotFound { workflow_id: workflow_id.to_string() })?;
        let Some(step) = workflow.current() else {
            return Ok(workflow.status == WorkflowStatus::Approved);
        };
        let outcome = runtime.kernel.process_approval(
            workflow_id,
            &step.step_id,
            true,
            APPROVER,
            Some("confirmed with customer by phone"),
        )?;
        if outcome.completed {
            return Ok(outcome.approved);
        }
    }
}

pub async fn run(runtime: &ReferenceRuntime) -> GovernanceResult<ApprovalReport> {
    let ledger = Arc::new(Ledger::new());
    let skill = runtime.kernel.register_skill(
        skills::payment_transfer(),
        Arc::new(PaymentGateway { ledger: Arc::clone(&ledger) }),
    );

    // ── Held for approval, then approved and resumed ──
    let held = runtime
        .kernel
        .execute_skill(PAYMENT_TRANSFER, transfer(60_000.0), customer())
        .await?;
    let workflow_id = workflow_of(&held);
    let charges_while_pending = ledger.active_charges();

    let mut approved = false;
    let mut resumed = false;
    let mut transfer_status = None;
    let mut second_resume_code = None;
    if let Some(id) = &workflow_id {
        approved = approve_all(runtime, id)?;
        let first = runtime.kernel.resume_approved(id).await?;
        resumed = first.success;
        transfer_status = first
            .result
            .as_ref()
            .and_then(|r| r["status"].as_str())
            .map(str::to_string);
        second_resume_code = runtime.kernel.resume_approved(id).await.err().map(|e| e.code().to_string());
    }

    // ── Rejected ──
    let rejected = runtime
        .kernel
        .execute_skill(PAYMENT_TRANSFER, transfer(75_000.0), customer())
        .await?;
    let mut rejected_resume_code = None;
    if let Some(id) = workflow_of(&rejected) {
        if let Some(step) = runtime.kernel.approval_status(&id).and_then(|w| w.current().cloned()) {
            runtime
                .kernel
                .process_approval(&id, &step.step_id, false, APPROVER, Some("recipient not verified"))?;
        }
        rejected_resume_code = runtime.kernel.resume_approved(&id).await.err().map(|e| e.code().to_string());
    }

    // ── Left unattended ──
    // Opened two hours ago against a 30 minute deadline.
    let opened_at = Utc::now() - ChronoDuration::hours(2);
    let decision = runtime.policy.evaluate_at(&skill, &customer(), &transfer(55_000.0), opened_at)?;
    let mut expired_status = None;
    if let Some(id) = decision.workflow_id {
        runtime.kernel.sweep_expired_workflows();
        expired_status = runtime.kernel.approval_status(&id).map(|w| w.status);
    }

    Ok(ApprovalReport {
        held_code: held.error_code().map(str::to_string),
        workflow_id,
        charges_while_pending,
        approved,
        resumed,
        transfer_status,
        second_resume_code,
        rejected_resume_code,
        expired_status,
        ledger_balance: ledger.balance(),
        audit_events: runtime.audit.len(),
        audit_verified: runtime.audit.verify_integrity(),
    })
}

pub async fn run_scenario(config: KernelConfig) -> GovernanceResult<()> {
    println!("=== Scenario 2: High-Value Payment Approval ===");
    println!();
    println!("  Customer:  {CUSTOMER}");
    println!("  Transfer:  NPR 60000 → prov-003");
    println!();

    let runtime = ReferenceRuntime::open(config).await?;
    let report = run(&runtime).await;
    runtime.shutdown().await;
    let report = report?;

    println!("  Step 1 — payment-transfer");
    println!("  Outcome:    {}", report.held_code.as_deref().unwrap_or("unexpected success"));
    println!("  Workflow:   {}", report.workflow_id.as_deref().unwrap_or("-"));
    println!("  Charges while pending: {}", report.charges_while_pending);
    println!();

    println!("  Step 2 — {APPROVER} approves, request resumed");
    println!("  Approved:   {}", if report.approved { "YES" } else { "NO" });
    println!(
        "  Executed:   {} (transfer {})",
        if report.resumed { "YES" } else { "NO" },
        report.transfer_status.as_deref().unwrap_or("?")
    );
    println!();

    println!("  Step 3 — second resume attempt");
    println!("  Outcome:    {}", report.second_resume_code.as_deref().unwrap_or("unexpected success"));
    println!();

    println!("  ── Side cases ──");
    println!(
        "  Rejected NPR 75000 transfer, resume: {}",
        report.rejected_resume_code.as_deref().unwrap_or("unexpected success")
    );
    println!("  Unattended NPR 55000 transfer after sweep: {:?}", report.expired_status);
    println!();

    println!("  Ledger balance: NPR {}", report.ledger_balance);
    println!(
        "  Audit chain:    {} ({} event(s))",
        if report.audit_verified { "VERIFIED" } else { "FAILED" },
        report.audit_events
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::demo_config;

    #[tokio::test]
    async fn approved_transfer_runs_exactly_once() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let report = run(&runtime).await.unwrap();
        runtime.shutdown().await;

        assert_eq!(report.held_code.as_deref(), Some("APPROVAL_REQUIRED"));
        assert!(report.workflow_id.is_some());
        assert_eq!(report.charges_while_pending, 0);
        assert!(report.approved);
        assert!(report.resumed);
        assert_eq!(report.transfer_status.as_deref(), Some("settled"));
        assert_eq!(report.second_resume_code.as_deref(), Some("WORKFLOW_NOT_APPROVED"));
        // Only the approved transfer was charged.
        assert_eq!(report.ledger_balance, 60_000.0);
        assert!(report.audit_verified);
    }

    #[tokio::test]
    async fn rejected_and_expired_workflows_cannot_resume() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let report = run(&runtime).await.unwrap();
        runtime.shutdown().await;

        assert_eq!(report.rejected_resume_code.as_deref(), Some("WORKFLOW_NOT_APPROVED"));
        assert_eq!(report.expired_status, Some(WorkflowStatus::Expired));
    }

    #[tokio::test]
    async fn resume_records_approval_before_execution() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let ledger = Arc::new(Ledger::new());
        runtime
            .kernel
            .register_skill(skills::payment_transfer(), Arc::new(PaymentGateway { ledger }));

        let held = runtime
            .kernel
            .execute_skill(PAYMENT_TRANSFER, transfer(90_000.0), customer())
            .await
            .unwrap();
        let workflow_id = workflow_of(&held).unwrap();
        assert!(approve_all(&runtime, &workflow_id).unwrap());

        let resumed = runtime.kernel.resume_approved(&workflow_id).await.unwrap();
        runtime.shutdown().await;

        let events: Vec<&str> = resumed.metadata.audit_trail.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(events, ["approval_resumed", "job_completed"]);
    }

    #[tokio::test]
    async fn small_transfer_is_not_held() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let ledger = Arc::new(Ledger::new());
        runtime.kernel.register_skill(
            skills::payment_transfer(),
            Arc::new(PaymentGateway { ledger: Arc::clone(&ledger) }),
        );

        let noon = Utc::now().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        let result = runtime
            .kernel
            .execute_skill(PAYMENT_TRANSFER, transfer(2_500.0), customer().with_timestamp(noon))
            .await
            .unwrap();
        runtime.shutdown().await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(ledger.balance(), 2_500.0);
    }
}
