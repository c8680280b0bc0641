//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   3. canonical JSON of the record (serde_json, no pretty-printing)

use sha2::{Digest, Sha256};

use skillgate_contracts::{
    error::{GovernanceError, GovernanceResult},
    execution::AuditRecord,
};

use crate::event::AuditEvent;

/// Compute the SHA-256 hash for a single audit event.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_event(sequence: u64, record: &AuditRecord, prev_hash: &str) -> GovernanceResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| GovernanceError::AuditWriteFailed {
        reason: format!("audit record is not serializable: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of a hash chain.
///
/// Returns `true` when every event's `prev_hash` equals the preceding
/// event's `this_hash` (or `GENESIS_HASH` for the first), every
/// `this_hash` matches the value recomputed from its own fields, and
/// sequence numbers run 0, 1, 2, ... without gaps. An empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    let mut expected_prev = AuditEvent::GENESIS_HASH;

    for (position, event) in events.iter().enumerate() {
        if event.sequence != position as u64 || event.prev_hash != expected_prev {
            return false;
        }

        match hash_event(event.sequence, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }

        expected_prev = &event.this_hash;
    }

    true
}
