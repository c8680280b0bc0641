//! Scenario 4: Book-and-Pay Saga
//!
//! Booking a provider touches two systems, so it runs as a saga:
//!
//!   reserve-slot → charge-customer (retried) → notify-provider
//!
//! Sub-case A: prov-001 is reachable, all three steps complete.
//! Sub-case B: prov-002 is offline, notification fails and the completed
//!             steps are compensated newest first: refund, then release.
//!             The ledger ends exactly where it started.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use skillgate_contracts::{
    context::{ExecutionContext, UserRole},
    error::GovernanceResult,
    execution::ExecutionResult,
};
use skillgate_core::KernelConfig;

use crate::mock_data::Ledger;
use crate::runtime::ReferenceRuntime;
use crate::skills::{self, BOOK_AND_PAY};

const CUSTOMER: &str = "cust-412";

#[derive(Debug, Clone)]
pub struct SagaOutcome {
    pub success: bool,
    pub error_code: Option<String>,
    pub rollback_id: Option<String>,
    /// Step names in the order they were compensated.
    pub compensated: Vec<String>,
    pub reservations: usize,
    pub charges: usize,
    pub balance: f64,
}

#[derive(Debug, Clone)]
pub struct SagaScenarioReport {
    pub happy: SagaOutcome,
    pub offline: SagaOutcome,
    pub audit_events: usize,
    pub audit_verified: bool,
}

fn booking(provider_id: &str) -> Map<String, Value> {
    let mut initial = Map::new();
    initial.insert("providerId".into(), json!(provider_id));
    initial.insert("service".into(), json!("house-cleaning"));
    initial.insert("hours".into(), json!(2));
    initial
}

fn outcome(result: &ExecutionResult, ledger: &Ledger) -> SagaOutcome {
    let compensated = result
        .metadata
        .audit_trail
        .iter()
        .filter(|e| e.event == "saga_step_compensated")
        .filter_map(|e| e.details["stepName"].as_str().map(str::to_string))
        .collect();

    SagaOutcome {
        success: result.success,
        error_code: result.error_code().map(str::to_string),
        rollback_id: result.metadata.rollback_id.clone(),
        compensated,
        reservations: ledger.active_reservations(),
        charges: ledger.active_charges(),
        balance: ledger.balance(),
    }
}

pub async fn run(runtime: &ReferenceRuntime) -> GovernanceResult<SagaScenarioReport> {
    let context = || ExecutionContext::new(CUSTOMER, UserRole::Customer);

    let ledger = Arc::new(Ledger::new());
    runtime.kernel.register_saga(BOOK_AND_PAY, skills::book_and_pay_steps(&ledger));
    let happy = runtime.kernel.execute_saga(BOOK_AND_PAY, booking("prov-001"), context()).await?;
    let happy = outcome(&happy, &ledger);

    // Fresh ledger so sub-case B starts empty.
    let ledger = Arc::new(Ledger::new());
    runtime.kernel.register_saga(BOOK_AND_PAY, skills::book_and_pay_steps(&ledger));
    let offline = runtime.kernel.execute_saga(BOOK_AND_PAY, booking("prov-002"), context()).await?;
    let offline = outcome(&offline, &ledger);

    Ok(SagaScenarioReport {
        happy,
        offline,
        audit_events: runtime.audit.len(),
        audit_verified: runtime.audit.verify_integrity(),
    })
}

fn print_outcome(outcome: &SagaOutcome) {
    println!(
        "  Outcome:      {}",
        if outcome.success { "COMPLETED" } else { outcome.error_code.as_deref().unwrap_or("FAILED") }
    );
    if !outcome.compensated.is_empty() {
        println!("  Compensated:  {}", outcome.compensated.join(" → "));
    }
    println!("  Rollback id:  {}", outcome.rollback_id.as_deref().unwrap_or("-"));
    println!(
        "  Ledger:       {} reservation(s), {} charge(s), NPR {}",
        outcome.reservations, outcome.charges, outcome.balance
    );
}

pub async fn run_scenario(config: KernelConfig) -> GovernanceResult<()> {
    println!("=== Scenario 4: Book-and-Pay Saga ===");
    println!();
    println!("  Customer: {CUSTOMER} | Service: house-cleaning (2 hours)");
    println!();

    let runtime = ReferenceRuntime::open(config).await?;
    let report = run(&runtime).await;
    runtime.shutdown().await;
    let report = report?;

    println!("  ── Sub-case A: prov-001 (reachable) ──");
    print_outcome(&report.happy);
    println!();

    println!("  ── Sub-case B: prov-002 (offline) ──");
    print_outcome(&report.offline);
    println!();

    println!(
        "  Audit chain:  {} ({} event(s))",
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
    async fn reachable_provider_commits_every_step() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let report = run(&runtime).await.unwrap();
        runtime.shutdown().await;

        let happy = report.happy;
        assert!(happy.success);
        assert!(happy.compensated.is_empty());
        assert_eq!(happy.reservations, 1);
        assert_eq!(happy.charges, 1);
        assert_eq!(happy.balance, 1600.0);
    }

    #[tokio::test]
    async fn offline_provider_is_compensated_in_reverse() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let report = run(&runtime).await.unwrap();
        runtime.shutdown().await;

        let offline = report.offline;
        assert!(!offline.success);
        assert_eq!(offline.error_code.as_deref(), Some("SAGA_EXECUTION_FAILED"));
        assert!(offline.rollback_id.is_some());
        assert_eq!(offline.compensated, ["payment", "reservation"]);
        assert_eq!(offline.reservations, 0);
        assert_eq!(offline.charges, 0);
        assert_eq!(offline.balance, 0.0);
        assert!(report.audit_verified);
    }

    #[tokio::test]
    async fn saga_result_carries_every_step() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let ledger = Arc::new(Ledger::new());
        runtime.kernel.register_saga(BOOK_AND_PAY, skills::book_and_pay_steps(&ledger));

        let result = runtime
            .kernel
            .execute_saga(
                BOOK_AND_PAY,
                booking("prov-001"),
                ExecutionContext::new(CUSTOMER, UserRole::Customer).with_transaction_id("txn-saga-1"),
            )
            .await
            .unwrap();
        runtime.shutdown().await;

        let context = result.result.unwrap();
        assert_eq!(context["transactionId"], "txn-saga-1");
        assert_eq!(context["payment"]["amount"], json!(1600.0));
        assert_eq!(context["payment"]["reservationId"], context["reservation"]["reservationId"]);
        assert_eq!(context["notification"]["notified"], "prov-001");
        assert_eq!(runtime.audit.events_for("txn-saga-1").len(), 3);
    }
}
