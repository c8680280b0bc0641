//! # skillgate-policy
//!
//! A prioritised, condition-based admission policy engine for the skillgate
//! runtime.
//!
//! ## Overview
//!
//! This crate provides [`RulePolicyEngine`], which implements the
//! [`PolicyEngine`](skillgate_core::traits::PolicyEngine) trait. Rules are
//! declared in TOML (or added at runtime), matched against the skill id by
//! exact id or glob, and evaluated in ascending priority order. The first rule
//! whose conditions all hold decides; if none does, the request is allowed.
//!
//! A `require_approval` rule opens an [`ApprovalWorkflow`] that approvers
//! advance through `process_approval`, and that the periodic sweep expires
//! once its deadline passes.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use skillgate_policy::RulePolicyEngine;
//!
//! let engine = RulePolicyEngine::with_default_policies()?;
//! // Pass `Arc::new(engine)` to `skillgate_core::ExecutionKernel::new(...)`.
//! ```
//!
//! [`ApprovalWorkflow`]: skillgate_contracts::approval::ApprovalWorkflow

pub mod condition;
pub mod engine;
pub mod risk;
pub mod rule;
pub mod workflow;

pub use engine::{RulePolicyEngine, DEFAULT_POLICIES};
pub use rule::{PolicyConfig, PolicyEngineConfig};

// ── Tests ─────────────────────────────────────────────────────────────────────
