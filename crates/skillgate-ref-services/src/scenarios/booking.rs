//! Scenario 1: Booking Assistant
//!
//! A customer asks for a house cleaning quote three ways:
//!
//!   Sync request   → admitted → queued → validated → executed → job_completed
//!   Async request  → admitted → queued → caller gets a job id, polls to completion
//!   Empty message  → admitted → queued → input schema rejects → VALIDATION_ERROR
//!
//! The third request shows that schema validation sits between the queue and
//! the executor: the assistant never sees a malformed request.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use skillgate_contracts::{
    context::{ExecutionContext, UserRole},
    error::GovernanceResult,
    job::JobStatus,
};
use skillgate_core::KernelConfig;

use crate::runtime::{queued_job_id, ReferenceRuntime};
use crate::skills::{self, BookingAssistant, BOOKING_ASSISTANT};

const CUSTOMER: &str = "cust-201";

#[derive(Debug, Clone)]
pub struct BookingReport {
    pub sync_reply: Option<String>,
    pub sync_quote: Option<f64>,
    pub async_status: JobStatus,
    pub invalid_error_code: Option<String>,
    pub audit_events: usize,
    pub audit_verified: bool,
}

fn customer() -> ExecutionContext {
    ExecutionContext::new(CUSTOMER, UserRole::Customer)
}

/// Run all three requests against a started runtime.
pub async fn run(runtime: &ReferenceRuntime) -> GovernanceResult<BookingReport> {
    runtime
        .kernel
        .register_skill(skills::booking_assistant(), Arc::new(BookingAssistant));

    let request = json!({
        "message": "Can someone clean my flat on Saturday?",
        "service": "house-cleaning",
        "hours": 3
    });

    let sync = runtime
        .kernel
        .execute_skill(BOOKING_ASSISTANT, request.clone(), customer().synchronous())
        .await?;
    let output = sync.result.as_ref();

    let queued = runtime
        .kernel
        .execute_skill(BOOKING_ASSISTANT, request, customer())
        .await?;
    let async_status = match queued_job_id(&queued) {
        Some(job_id) => runtime.wait_for_job(&job_id, Duration::from_secs(2)).await,
        None => JobStatus::Unknown,
    };

    let invalid = runtime
        .kernel
        .execute_skill(
            BOOKING_ASSISTANT,
            json!({ "message": "", "service": "house-cleaning" }),
            customer().synchronous(),
        )
        .await?;

    Ok(BookingReport {
        sync_reply: output.and_then(|o| o["reply"].as_str()).map(str::to_string),
        sync_quote: output.and_then(|o| o["quote"].as_f64()),
        async_status,
        invalid_error_code: invalid.error_code().map(str::to_string),
        audit_events: runtime.audit.len(),
        audit_verified: runtime.audit.verify_integrity(),
    })
}

pub async fn run_scenario(config: KernelConfig) -> GovernanceResult<()> {
    println!("=== Scenario 1: Booking Assistant ===");
    println!();
    println!("  Customer: {CUSTOMER} | Service: house-cleaning (3 hours)");
    println!();

    let runtime = ReferenceRuntime::open(config).await?;
    let report = run(&runtime).await;
    runtime.shutdown().await;
    let report = report?;

    println!("  ── Synchronous request ──");
    match (&report.sync_reply, report.sync_quote) {
        (Some(reply), Some(quote)) => {
            println!("  Reply:  {reply}");
            println!("  Quote:  NPR {quote}");
        }
        _ => println!("  UNEXPECTED: no reply from the assistant"),
    }
    println!();

    println!("  ── Asynchronous request ──");
    println!("  Job status after polling: {:?}", report.async_status);
    println!();

    println!("  ── Malformed request (empty message) ──");
    println!(
        "  Outcome: {} (assistant never invoked)",
        report.invalid_error_code.as_deref().unwrap_or("unexpected success")
    );
    println!();

    println!(
        "  Audit chain: {} ({} event(s))",
        if report.audit_verified { "VERIFIED" } else { "FAILED" },
        report.audit_events
    );
    println!();
    Ok(())
}
