//! Scenario 3: Provider Directory Outage
//!
//! The upstream provider directory goes down while the `provider-sync` admin
//! skill keeps getting called.
//!
//!   Calls 1..N   → executed, fail                 (breaker counts failures)
//!   Call N+1     → CIRCUIT_BREAKER_OPEN           (executor not called)
//!   [recovery timeout elapses, upstream restored]
//!   Trial call   → half-open → succeeds → closed  (failure count cleared)

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use skillgate_contracts::{
    breaker::CircuitState,
    context::{ExecutionContext, UserRole},
    error::GovernanceResult,
};
use skillgate_core::KernelConfig;

use crate::runtime::ReferenceRuntime;
use crate::skills::{self, ProviderSync, PROVIDER_SYNC};

#[derive(Debug, Clone)]
pub struct BreakerReport {
    /// Error code of every call made during the outage, in order.
    pub outage_codes: Vec<String>,
    pub state_after_outage: Option<CircuitState>,
    /// Executor invocations before and after the fail-fast call.
    pub calls_before_fail_fast: u32,
    pub calls_after_fail_fast: u32,
    pub fail_fast_code: Option<String>,
    pub trial_succeeded: bool,
    pub state_after_trial: Option<CircuitState>,
    pub failures_after_trial: u32,
}

fn scheduler() -> ExecutionContext {
    ExecutionContext::new("sync-scheduler", UserRole::System).synchronous()
}

pub async fn run(runtime: &ReferenceRuntime) -> GovernanceResult<BreakerReport> {
    let sync = Arc::new(ProviderSync::default());
    runtime.kernel.register_skill(skills::provider_sync(), sync.clone());

    let threshold = runtime.kernel.config().breaker.failure_threshold;
    let recovery = Duration::from_millis(runtime.kernel.config().breaker.recovery_timeout_ms);

    sync.set_outage(true);
    let mut outage_codes = Vec::new();
    for _ in 0..threshold {
        let result = runtime.kernel.execute_skill(PROVIDER_SYNC, json!({}), scheduler()).await?;
        outage_codes.push(result.error_code().unwrap_or("OK").to_string());
    }
    let state_after_outage = runtime.kernel.circuit_breakers().state(PROVIDER_SYNC);

    let calls_before_fail_fast = sync.calls();
    let fail_fast = runtime.kernel.execute_skill(PROVIDER_SYNC, json!({}), scheduler()).await?;
    let calls_after_fail_fast = sync.calls();

    sync.set_outage(false);
    tokio::time::sleep(recovery + Duration::from_millis(100)).await;

    let trial = runtime.kernel.execute_skill(PROVIDER_SYNC, json!({}), scheduler()).await?;
    let snapshot = runtime.kernel.circuit_breaker(PROVIDER_SYNC);

    Ok(BreakerReport {
        outage_codes,
        state_after_outage,
        calls_before_fail_fast,
        calls_after_fail_fast,
        fail_fast_code: fail_fast.error_code().map(str::to_string),
        trial_succeeded: trial.success,
        state_after_trial: snapshot.as_ref().map(|s| s.state),
        failures_after_trial: snapshot.map_or(0, |s| s.failures),
    })
}

pub async fn run_scenario(config: KernelConfig) -> GovernanceResult<()> {
    println!("=== Scenario 3: Provider Directory Outage ===");
    println!();
    println!(
        "  Breaker:  threshold {} failure(s), recovery after {} ms",
        config.breaker.failure_threshold, config.breaker.recovery_timeout_ms
    );
    println!();

    let runtime = ReferenceRuntime::open(config).await?;
    let report = run(&runtime).await;
    runtime.shutdown().await;
    let report = report?;

    println!("  ── Upstream down ──");
    for (i, code) in report.outage_codes.iter().enumerate() {
        println!("  Call {}: {code}", i + 1);
    }
    println!("  Breaker: {:?}", report.state_after_outage);
    println!();

    println!("  ── Next call ──");
    println!("  Outcome:  {}", report.fail_fast_code.as_deref().unwrap_or("unexpected success"));
    println!(
        "  Executor: {}",
        if report.calls_after_fail_fast == report.calls_before_fail_fast {
            "NOT CALLED"
        } else {
            "CALLED"
        }
    );
    println!();

    println!("  ── Upstream restored, recovery timeout elapsed ──");
    println!("  Trial:    {}", if report.trial_succeeded { "SUCCESS" } else { "FAILED" });
    println!(
        "  Breaker:  {:?} ({} failure(s))",
        report.state_after_trial, report.failures_after_trial
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::demo_config;

    #[tokio::test]
    async fn breaker_opens_then_recovers() {
        let config = demo_config().unwrap();
        let threshold = config.breaker.failure_threshold;
        let runtime = ReferenceRuntime::open(config).await.unwrap();
        let report = run(&runtime).await.unwrap();
        runtime.shutdown().await;

        assert_eq!(report.outage_codes.len(), threshold as usize);
        assert!(report.outage_codes.iter().all(|c| c != "OK" && c != "CIRCUIT_BREAKER_OPEN"));
        assert_eq!(report.state_after_outage, Some(CircuitState::Open));

        assert_eq!(report.fail_fast_code.as_deref(), Some("CIRCUIT_BREAKER_OPEN"));
        assert_eq!(report.calls_before_fail_fast, threshold);
        assert_eq!(report.calls_after_fail_fast, threshold);

        assert!(report.trial_succeeded);
        assert_eq!(report.state_after_trial, Some(CircuitState::Closed));
        assert_eq!(report.failures_after_trial, 0);
    }

    #[tokio::test]
    async fn failed_trial_reopens_breaker() {
        let runtime = ReferenceRuntime::open(demo_config().unwrap()).await.unwrap();
        let sync = Arc::new(ProviderSync::default());
        runtime.kernel.register_skill(skills::provider_sync(), sync.clone());
        let threshold = runtime.kernel.config().breaker.failure_threshold;
        let recovery = runtime.kernel.config().breaker.recovery_timeout_ms;

        sync.set_outage(true);
        for _ in 0..threshold {
            runtime.kernel.execute_skill(PROVIDER_SYNC, json!({}), scheduler()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(recovery + 100)).await;

        // Upstream still down: the trial runs and fails.
        let trial = runtime.kernel.execute_skill(PROVIDER_SYNC, json!({}), scheduler()).await.unwrap();
        assert!(!trial.success);
        assert_eq!(sync.calls(), threshold + 1);
        assert_eq!(runtime.kernel.circuit_breakers().state(PROVIDER_SYNC), Some(CircuitState::Open));

        let rejected = runtime.kernel.execute_skill(PROVIDER_SYNC, json!({}), scheduler()).await.unwrap();
        runtime.shutdown().await;
        assert_eq!(rejected.error_code(), Some("CIRCUIT_BREAKER_OPEN"));
        assert_eq!(sync.calls(), threshold + 1);
    }
}
