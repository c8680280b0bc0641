//! # skillgate-contracts
//!
//! Shared types, schemas, and contracts for the skillgate governance runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions and error types.

pub mod approval;
pub mod breaker;
pub mod context;
pub mod error;
pub mod execution;
pub mod job;
pub mod policy;
pub mod skill;
pub mod stats;
pub mod validation;
