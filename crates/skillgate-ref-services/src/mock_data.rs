//! Simulated home-services data for the skillgate reference runtime.
//!
//! All data in this module is hardcoded and fictional. The `Ledger` stands in
//! for the booking and payment systems a saga would touch in production.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use uuid::Uuid;

// ── Service catalogue (mock) ─────────────────────────────────────────────────

/// Hourly rate in NPR for a known service, or `None`.
pub fn hourly_rate(service: &str) -> Option<f64> {
    match service {
        "house-cleaning" => Some(800.0),
        "plumbing" => Some(1200.0),
        "electrical" => Some(1500.0),
        "gardening" => Some(600.0),
        _ => None,
    }
}

/// Price for `hours` of `service`. Unknown services quote zero.
pub fn quote(service: &str, hours: u64) -> f64 {
    hourly_rate(service).unwrap_or(0.0) * hours as f64
}

/// Providers offering `service`, best rated first.
pub fn providers_for(service: &str) -> Vec<Value> {
    let all: [(&str, &str, &str, f64); 5] = [
        ("prov-001", "Himalayan Cleaners", "house-cleaning", 4.8),
        ("prov-002", "Kathmandu Sparkle", "house-cleaning", 4.5),
        ("prov-003", "Bagmati Plumbing Co.", "plumbing", 4.7),
        ("prov-004", "Lalitpur Electric", "electrical", 4.6),
        ("prov-005", "Everest Gardens", "gardening", 4.2),
    ];

    let mut matching: Vec<_> = all.iter().filter(|(_, _, s, _)| *s == service).collect();
    matching.sort_by(|a, b| b.3.total_cmp(&a.3));
    matching
        .into_iter()
        .map(|(id, name, _, rating)| json!({ "providerId": id, "name": name, "rating": rating }))
        .collect()
}

/// Providers the mock notification gateway cannot reach.
pub fn is_offline(provider_id: &str) -> bool {
    provider_id == "prov-002"
}

// ── Booking and payment ledger (mock) ────────────────────────────────────────

#[derive(Debug, Default)]
struct LedgerState {
    reservations: BTreeMap<String, String>,
    charges: BTreeMap<String, f64>,
}

/// In-memory reservations and charges, shared by the saga steps.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold a slot with `provider_id`. Returns the reservation id.
    pub fn reserve(&self, provider_id: &str) -> String {
        let id = format!("res-{}", Uuid::new_v4());
        self.state().reservations.insert(id.clone(), provider_id.to_string());
        id
    }

    pub fn release(&self, reservation_id: &str) -> bool {
        self.state().reservations.remove(reservation_id).is_some()
    }

    /// Capture `amount` NPR. Returns the charge id.
    pub fn charge(&self, amount: f64) -> String {
        let id = format!("chg-{}", Uuid::new_v4());
        self.state().charges.insert(id.clone(), amount);
        id
    }

    pub fn refund(&self, charge_id: &str) -> bool {
        self.state().charges.remove(charge_id).is_some()
    }

    pub fn active_reservations(&self) -> usize {
        self.state().reservations.len()
    }

    pub fn active_charges(&self) -> usize {
        self.state().charges.len()
    }

    /// Sum of all captured charges still held.
    pub fn balance(&self) -> f64 {
        self.state().charges.values().sum()
    }
}
