//! In-memory implementation of `AuditSink`.
//!
//! `InMemoryAuditSink` keeps every event in a `Vec` behind a `Mutex`, so the
//! kernel's callers and its worker tasks can record concurrently. One chain
//! covers every transaction the kernel handles; `events_for` filters it by
//! transaction id.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use skillgate_contracts::{error::GovernanceResult, execution::AuditRecord};
use skillgate_core::traits::AuditSink;

use crate::{
    chain::{hash_event, verify_chain},
    event::{AuditEvent, AuditLog},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct InMemoryState {
    /// All events written so far, in append order.
    pub(crate) events: Vec<AuditEvent>,

    /// The `this_hash` of the last event, or `GENESIS_HASH` before any event.
    pub(crate) last_hash: String,
}

// ── Public sink ───────────────────────────────────────────────────────────────

/// An append-only audit sink backed by a SHA-256 hash chain.
pub struct InMemoryAuditSink {
    pub(crate) state: Mutex<InMemoryState>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                events: Vec::new(),
                last_hash: AuditEvent::GENESIS_HASH.to_string(),
            }),
        }
    }

    // The chain is only extended after the new hash is computed, so a
    // poisoned lock still guards a consistent chain.
    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Export a sealed `AuditLog` containing all events written so far.
    pub fn export_log(&self) -> AuditLog {
        let state = self.state();
        let terminal_hash = state
            .events
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        info!(event_count = state.events.len(), terminal_hash = %terminal_hash, "audit log exported");

        AuditLog {
            events: state.events.clone(),
            exported_at: Utc::now(),
            terminal_hash,
        }
    }

    /// Verify that the in-memory chain has not been tampered with.
    pub fn verify_integrity(&self) -> bool {
        verify_chain(&self.state().events)
    }

    /// Events recorded for one transaction, in chain order.
    pub fn events_for(&self, transaction_id: &str) -> Vec<AuditEvent> {
        self.state()
            .events
            .iter()
            .filter(|e| e.record.transaction_id == transaction_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

// ── AuditSink impl ────────────────────────────────────────────────────────────

impl AuditSink for InMemoryAuditSink {
    /// Append one record to the hash chain.
    ///
    /// Returns `Err(AuditWriteFailed)` if the record cannot be serialized for
    /// hashing; the chain is left unchanged in that case.
    fn record(&self, record: &AuditRecord) -> GovernanceResult<()> {
        let mut state = self.state();

        let prev_hash = state.last_hash.clone();
        let sequence = state.events.len() as u64;
        let this_hash = hash_event(sequence, record, &prev_hash)?;

        debug!(
            sequence,
            transaction_id = %record.transaction_id,
            event = %record.entry.event,
            "audit event appended"
        );

        state.events.push(AuditEvent {
            sequence,
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.last_hash = this_hash;

        Ok(())
    }
}
