//! # skillgate-ref-services
//!
//! Home-services reference runtime for the skillgate governed execution layer.
//!
//! Demonstrates four scenarios using mock data:
//!
//! 1. **Booking Assistant**: schema-validated customer skill, allowed by
//!    the default policy set, executed synchronously and asynchronously.
//! 2. **High-Value Payment**: a large transfer parked behind an approval
//!    workflow, approved by an admin and resumed exactly once.
//! 3. **Provider Sync Outage**: a failing upstream trips the skill's circuit
//!    breaker, callers fail fast, and the breaker recovers through half-open.
//! 4. **Book-and-Pay Saga**: reserve, charge and notify as one saga, with
//!    reverse-order compensation when the last step fails.
//!
//! All data is hardcoded and fictional. No external services are contacted.

pub mod mock_data;
pub mod runtime;
pub mod scenarios;
pub mod skills;
