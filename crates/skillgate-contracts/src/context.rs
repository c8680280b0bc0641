//! Per-invocation execution context.
//!
//! The caller builds one `ExecutionContext` per skill invocation. The runtime
//! never mutates it; the policy engine derives a separate evaluation document
//! from it and adds computed fields there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::skill::PermissionLevel;

/// Role of the principal on whose behalf a skill runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Provider,
    Admin,
    SuperAdmin,
    System,
}

/// A per-resource request window the caller is subject to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitWindow {
    pub resource: String,
    pub limit: u32,
    pub window_ms: u64,
}

/// Everything known about the caller for one invocation.
///
/// Serialized in camelCase: policy conditions address these fields by name
/// (`userRole`, `geofence`, `spendingLimit`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub user_id: String,
    pub user_role: UserRole,
    pub session_id: String,
    /// Correlates every audit entry of one logical operation. Generated by the
    /// kernel when absent.
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub autonomy_level: PermissionLevel,
    #[serde(default = "default_geofence")]
    pub geofence: String,
    pub spending_limit: f64,
    #[serde(default)]
    pub rate_limits: Vec<RateLimitWindow>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Block the caller until the queued job finishes (bounded by the sync timeout).
    #[serde(default)]
    pub sync: bool,
    /// Free-form caller metadata, visible to policy conditions as `metadata.*`.
    #[serde(default)]
    pub metadata: Value,
}

fn default_geofence() -> String {
    "nepal".to_string()
}

impl ExecutionContext {
    /// Build a context with permissive defaults for everything but identity.
    pub fn new(user_id: impl Into<String>, user_role: UserRole) -> Self {
        Self {
            user_id: user_id.into(),
            user_role,
            session_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: None,
            autonomy_level: PermissionLevel::ActLow,
            geofence: default_geofence(),
            spending_limit: 5_000.0,
            rate_limits: Vec::new(),
            timestamp: Utc::now(),
            sync: false,
            metadata: Value::Null,
        }
    }

    pub fn with_geofence(mut self, geofence: impl Into<String>) -> Self {
        self.geofence = geofence.into();
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.sync = true;
        self
    }
}
