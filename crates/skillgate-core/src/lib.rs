//! # skillgate-core
//!
//! The governed execution runtime for skillgate skills.
//!
//! This crate provides:
//! - The seam traits (`SkillExecutor`, `PolicyEngine`, `SchemaValidator`,
//!   `RateLimiter`, `DiagnosticSink`, `AuditSink`, `SagaAction`, `JobStore`)
//! - Per-skill circuit breakers, the priority job queue and worker pool, and
//!   the saga orchestrator
//! - The `ExecutionKernel` that wires them together in the correct trust order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use skillgate_core::{ExecutionKernel, KernelConfig, traits::SkillExecutor};
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod breaker;
pub mod config;
pub mod kernel;
pub mod queue;
pub mod registry;
pub mod saga;
pub mod store;
pub mod traits;

pub use config::KernelConfig;
pub use kernel::ExecutionKernel;
pub use saga::SagaStep;
pub use store::InMemoryJobStore;

// Shared maps are only mutated in short, panic-free sections, so a poisoned
// lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
