//! Reference skills and saga steps for the home-services runtime.
//!
//! Each skill is a descriptor plus an executor struct. Executors only touch
//! the mock data in [`crate::mock_data`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use skillgate_contracts::{
    context::ExecutionContext,
    error::{GovernanceError, GovernanceResult},
    skill::{AuditLevel, PermissionLevel, Skill, SkillCategory},
};
use skillgate_core::{
    traits::{SagaAction, SkillExecutor},
    SagaStep,
};

use crate::mock_data::{self, Ledger};

pub const BOOKING_ASSISTANT: &str = "booking-assistant";
pub const PAYMENT_TRANSFER: &str = "payment-transfer";
pub const PROVIDER_SYNC: &str = "provider-sync";
pub const BOOK_AND_PAY: &str = "book-and-pay";

// ── Booking assistant ─────────────────────────────────────────────────────────

pub fn booking_assistant() -> Skill {
    Skill::builder("Booking Assistant")
        .id(BOOKING_ASSISTANT)
        .description("Suggests providers and quotes a price for a home service")
        .category(SkillCategory::Customer)
        .permission_level(PermissionLevel::Suggest)
        .permissions(["bookings:read", "providers:read"])
        .input_schema(json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "minLength": 1 },
                "service": { "type": "string" },
                "hours": { "type": "integer", "minimum": 1, "maximum": 12 }
            },
            "required": ["message", "service"]
        }))
        .output_schema(json!({
            "type": "object",
            "required": ["reply", "providers", "quote"]
        }))
        .build()
}

pub struct BookingAssistant;

#[async_trait]
impl SkillExecutor for BookingAssistant {
    async fn execute(&self, input: &Value, _context: &ExecutionContext) -> GovernanceResult<Value> {
        let service = input["service"].as_str().unwrap_or_default();
        let hours = input["hours"].as_u64().unwrap_or(2);

        let providers = mock_data::providers_for(service);
        let reply = match providers.first() {
            Some(best) => format!(
                "{} can help with {service}; {hours} hour(s) would cost about NPR {}.",
                best["name"].as_str().unwrap_or("A provider"),
                mock_data::quote(service, hours)
            ),
            None => format!("Sorry, no providers currently offer {service}."),
        };

        Ok(json!({
            "reply": reply,
            "providers": providers,
            "quote": mock_data::quote(service, hours),
        }))
    }
}

// ── Payment transfer ──────────────────────────────────────────────────────────

pub fn payment_transfer() -> Skill {
    Skill::builder("Payment Transfer")
        .id(PAYMENT_TRANSFER)
        .description("Transfers funds from a customer wallet to a provider")
        .category(SkillCategory::Customer)
        .permission_level(PermissionLevel::ActLow)
        .permissions(["payments:write"])
        .rollback_capable()
        .audit_level(AuditLevel::Full)
        .input_schema(json!({
            "type": "object",
            "properties": {
                "amount": { "type": "number", "exclusiveMinimum": 0 },
                "recipient": { "type": "string" }
            },
            "required": ["amount", "recipient"]
        }))
        .output_schema(json!({
            "type": "object",
            "required": ["transferId", "status"]
        }))
        .build()
}

/// Settles transfers against the shared ledger.
pub struct PaymentGateway {
    pub ledger: Arc<Ledger>,
}

#[async_trait]
impl SkillExecutor for PaymentGateway {
    async fn execute(&self, input: &Value, _context: &ExecutionContext) -> GovernanceResult<Value> {
        let amount = input["amount"].as_f64().unwrap_or_default();
        let transfer_id = self.ledger.charge(amount);
        Ok(json!({
            "transferId": transfer_id,
            "recipient": input["recipient"],
            "amount": amount,
            "status": "settled",
        }))
    }
}

// ── Provider sync ─────────────────────────────────────────────────────────────

pub fn provider_sync() -> Skill {
    Skill::builder("Provider Directory Sync")
        .id(PROVIDER_SYNC)
        .description("Pulls availability from the upstream provider directory")
        .category(SkillCategory::Admin)
        .permission_level(PermissionLevel::ActLow)
        .build()
}

/// Fails with a retryable error while `outage` is set. Counts every call.
#[derive(Default)]
pub struct ProviderSync {
    pub outage: AtomicBool,
    pub calls: AtomicU32,
}

impl ProviderSync {
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SkillExecutor for ProviderSync {
    async fn execute(&self, _input: &Value, _context: &ExecutionContext) -> GovernanceResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.outage.load(Ordering::SeqCst) {
            return Err(GovernanceError::execution(PROVIDER_SYNC, "upstream directory unavailable (503)"));
        }
        Ok(json!({ "synced": mock_data::providers_for("house-cleaning").len() }))
    }
}

// ── Book-and-pay saga ─────────────────────────────────────────────────────────

fn field<'a>(context: &'a Map<String, Value>, key: &str) -> GovernanceResult<&'a Value> {
    context
        .get(key)
        .ok_or_else(|| GovernanceError::execution(BOOK_AND_PAY, format!("saga context is missing '{key}'")))
}

/// Holds a slot with the chosen provider.
pub struct ReserveSlot {
    pub ledger: Arc<Ledger>,
}

#[async_trait]
impl SagaAction for ReserveSlot {
    async fn execute(&self, context: &Map<String, Value>) -> GovernanceResult<Value> {
        let provider_id = field(context, "providerId")?.as_str().unwrap_or_default();
        let reservation_id = self.ledger.reserve(provider_id);
        Ok(json!({ "reservationId": reservation_id, "providerId": provider_id }))
    }

    async fn compensate(&self, result: &Value) -> GovernanceResult<()> {
        let id = result["reservationId"].as_str().unwrap_or_default();
        if self.ledger.release(id) {
            Ok(())
        } else {
            Err(GovernanceError::execution(BOOK_AND_PAY, format!("reservation {id} already released")))
        }
    }
}

/// Charges the customer the quoted price for the reserved slot.
pub struct ChargeCustomer {
    pub ledger: Arc<Ledger>,
}

#[async_trait]
impl SagaAction for ChargeCustomer {
    async fn execute(&self, context: &Map<String, Value>) -> GovernanceResult<Value> {
        let service = field(context, "service")?.as_str().unwrap_or_default();
        let hours = field(context, "hours")?.as_u64().unwrap_or(1);
        let reservation = field(context, "reservation")?;

        let amount = mock_data::quote(service, hours);
        let charge_id = self.ledger.charge(amount);
        Ok(json!({
            "chargeId": charge_id,
            "amount": amount,
            "reservationId": reservation["reservationId"],
        }))
    }

    async fn compensate(&self, result: &Value) -> GovernanceResult<()> {
        let id = result["chargeId"].as_str().unwrap_or_default();
        if self.ledger.refund(id) {
            Ok(())
        } else {
            Err(GovernanceError::execution(BOOK_AND_PAY, format!("charge {id} already refunded")))
        }
    }
}

/// Tells the provider about the booking. Nothing to undo.
pub struct NotifyProvider;

#[async_trait]
impl SagaAction for NotifyProvider {
    async fn execute(&self, context: &Map<String, Value>) -> GovernanceResult<Value> {
        let provider_id = field(context, "providerId")?.as_str().unwrap_or_default();
        if mock_data::is_offline(provider_id) {
            return Err(GovernanceError::execution(
                BOOK_AND_PAY,
                format!("provider {provider_id} is unreachable"),
            ));
        }
        Ok(json!({ "notified": provider_id }))
    }

    async fn compensate(&self, _result: &Value) -> GovernanceResult<()> {
        Ok(())
    }
}

/// Reserve → charge (retried) → notify.
pub fn book_and_pay_steps(ledger: &Arc<Ledger>) -> Vec<SagaStep> {
    vec![
        SagaStep::new("reserve-slot", "reservation", Arc::new(ReserveSlot { ledger: Arc::clone(ledger) })),
        SagaStep::new("charge-customer", "payment", Arc::new(ChargeCustomer { ledger: Arc::clone(ledger) }))
            .with_retries(2),
        SagaStep::new("notify-provider", "notification", Arc::new(NotifyProvider)),
    ]
}
