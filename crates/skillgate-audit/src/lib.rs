//! # skillgate-audit
//!
//! Append-only, SHA-256 hash-chained audit sink for the skillgate runtime.
//!
//! ## Overview
//!
//! Every audit entry the kernel attaches to an `ExecutionResult` is also
//! handed to the configured `AuditSink`. [`InMemoryAuditSink`] wraps each one
//! in an [`AuditEvent`] that links to the previous event via its SHA-256
//! hash. Tampering with any event breaks the chain and is detected by
//! [`verify_chain`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skillgate_audit::InMemoryAuditSink;
//!
//! let audit = Arc::new(InMemoryAuditSink::new());
//! // Pass `audit.clone()` to `ExecutionKernel::new(...)`, then later:
//! assert!(audit.verify_integrity());
//! let log = audit.export_log();
//! ```

pub mod chain;
pub mod event;
pub mod memory;

pub use chain::{hash_event, verify_chain};
pub use event::{AuditEvent, AuditLog};
pub use memory::InMemoryAuditSink;

// ── Tests ─────────────────────────────────────────────────────────────────────
