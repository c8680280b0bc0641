//! Per-skill circuit breakers.
//!
//! ```text
//! closed ──failures ≥ threshold──▶ open ──now ≥ next_attempt (on check)──▶ half_open
//!   ▲                                ▲                                       │
//!   └──────────── success ───────────┼───────────────────────────────────────┤
//!                                    └──────────────── failure ──────────────┘
//! ```
//!
//! Breakers gate execution independently of policy: an open breaker fails
//! fast before the policy engine or the queue is touched.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use skillgate_contracts::{
    breaker::{CircuitBreakerSnapshot, CircuitState},
    error::{GovernanceError, GovernanceResult},
};

use crate::config::BreakerConfig;
use crate::lock;

#[derive(Debug, Clone)]
struct Breaker {
    state: CircuitState,
    failures: u32,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt: Option<DateTime<Utc>>,
}

impl Breaker {
    fn closed() -> Self {
        Self { state: CircuitState::Closed, failures: 0, last_failure_time: None, next_attempt: None }
    }
}

/// Process-wide map of skill id to breaker state.
///
/// Every method takes the map lock for a single lookup-and-mutate and never
/// holds it across an await point.
pub struct CircuitBreakerRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::milliseconds(
                i64::try_from(config.recovery_timeout_ms).unwrap_or(i64::MAX),
            ),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Create a closed breaker for `skill_id`. Re-registering keeps existing state.
    pub fn register(&self, skill_id: &str) {
        lock(&self.breakers).entry(skill_id.to_string()).or_insert_with(Breaker::closed);
    }

    pub fn check(&self, skill_id: &str) -> GovernanceResult<()> {
        self.check_at(skill_id, Utc::now())
    }

    /// Fail fast while open. The first check after `next_attempt` moves the
    /// breaker to half-open and lets the request through.
    pub fn check_at(&self, skill_id: &str, now: DateTime<Utc>) -> GovernanceResult<()> {
        let mut breakers = lock(&self.breakers);
        let Some(breaker) = breakers.get_mut(skill_id) else {
            return Ok(());
        };

        if breaker.state != CircuitState::Open {
            return Ok(());
        }

        match breaker.next_attempt {
            Some(next) if now >= next => {
                breaker.state = CircuitState::HalfOpen;
                info!(skill_id = %skill_id, "circuit breaker half-open, probing");
                Ok(())
            }
            _ => Err(GovernanceError::CircuitBreakerOpen { skill_id: skill_id.to_string() }),
        }
    }

    pub fn record_failure(&self, skill_id: &str) {
        self.record_failure_at(skill_id, Utc::now());
    }

    pub fn record_failure_at(&self, skill_id: &str, now: DateTime<Utc>) {
        let mut breakers = lock(&self.breakers);
        let Some(breaker) = breakers.get_mut(skill_id) else {
            return;
        };

        breaker.failures = breaker.failures.saturating_add(1);
        breaker.last_failure_time = Some(now);

        let trips = breaker.state == CircuitState::HalfOpen
            || (breaker.state == CircuitState::Closed && breaker.failures >= self.failure_threshold);
        if trips {
            breaker.state = CircuitState::Open;
            breaker.next_attempt = Some(now + self.recovery_timeout);
            warn!(
                skill_id = %skill_id,
                failures = breaker.failures,
                "circuit breaker opened"
            );
        }
    }

    /// A success while half-open closes the breaker and clears the failure count.
    pub fn record_success(&self, skill_id: &str) {
        let mut breakers = lock(&self.breakers);
        let Some(breaker) = breakers.get_mut(skill_id) else {
            return;
        };

        if breaker.state == CircuitState::HalfOpen {
            breaker.state = CircuitState::Closed;
            breaker.failures = 0;
            breaker.next_attempt = None;
            info!(skill_id = %skill_id, "circuit breaker closed");
        }
    }

    /// Forgive one failure on every closed breaker that has any.
    pub fn decay(&self) -> usize {
        let mut breakers = lock(&self.breakers);
        let mut decayed = 0;
        for breaker in breakers.values_mut() {
            if breaker.state == CircuitState::Closed && breaker.failures > 0 {
                breaker.failures -= 1;
                decayed += 1;
            }
        }
        decayed
    }

    pub fn state(&self, skill_id: &str) -> Option<CircuitState> {
        lock(&self.breakers).get(skill_id).map(|b| b.state)
    }

    pub fn snapshot(&self, skill_id: &str) -> Option<CircuitBreakerSnapshot> {
        lock(&self.breakers).get(skill_id).map(|b| self.to_snapshot(skill_id, b))
    }

    /// All breakers, ordered by skill id.
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers = lock(&self.breakers);
        let mut out: Vec<_> = breakers.iter().map(|(id, b)| self.to_snapshot(id, b)).collect();
        out.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        out
    }

    fn to_snapshot(&self, skill_id: &str, breaker: &Breaker) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            skill_id: skill_id.to_string(),
            state: breaker.state,
            failures: breaker.failures,
            failure_threshold: self.failure_threshold,
            recovery_timeout_ms: u64::try_from(self.recovery_timeout.num_milliseconds()).unwrap_or(0),
            last_failure_time: breaker.last_failure_time,
            next_attempt: breaker.next_attempt,
        }
    }
}
