//! Reference runtime demo scenarios.
//!
//! Each scenario wires the real skillgate components (rule policy engine,
//! JSON Schema validator, hash-chained audit sink, execution kernel) to mock
//! home-services data and demonstrates one governance pattern.

pub mod approval;
pub mod booking;
pub mod breaker;
pub mod saga;
