//! Computed fields derived from a request: spending amount and risk score.

use serde_json::Value;

use skillgate_contracts::{
    context::{ExecutionContext, UserRole},
    skill::{PermissionLevel, Skill},
};

fn number(input: &Value, key: &str) -> Option<f64> {
    input.get(key).and_then(Value::as_f64)
}

/// Total spend a request commits to.
///
/// The skill's base cost, plus `amount` and `serviceValue` from the input,
/// plus `hours` billed at the base cost.
pub fn spending_amount(skill: &Skill, input: &Value) -> f64 {
    let base = skill.spending_cost;
    let mut amount = base;
    amount += number(input, "amount").unwrap_or(0.0);
    amount += number(input, "serviceValue").unwrap_or(0.0);
    amount += number(input, "hours").unwrap_or(0.0) * base;
    amount
}

/// Weighted risk score in `[0, 1]` attached to approval requests.
pub fn risk_score(skill: &Skill, context: &ExecutionContext, input: &Value, home_geofence: &str) -> f64 {
    let mut score: f64 = 0.0;

    if skill.destructive {
        score += 0.3;
    }
    if skill.required_permission_level == PermissionLevel::ActFull {
        score += 0.2;
    }
    if skill.spending_cost > 10_000.0 {
        score += 0.2;
    }

    if context.user_role == UserRole::Customer {
        score += 0.1;
    }
    if context.geofence != home_geofence {
        score += 0.2;
    }

    if number(input, "amount").is_some_and(|amount| amount > 50_000.0) {
        score += 0.3;
    }

    score.clamp(0.0, 1.0)
}
