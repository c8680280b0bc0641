//! Skill descriptors.
//!
//! A `Skill` is the immutable description of one registered capability. It is
//! created once at registration time, looked up by id for the lifetime of the
//! process, and never mutated. `SkillBuilder` is the fluent way to produce one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Functional area a skill belongs to.
///
/// `Admin` skills are queued with elevated priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    Customer,
    Provider,
    Admin,
    Content,
}

/// How much autonomy a skill needs to act.
///
/// Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    Suggest,
    ActLow,
    ActFull,
}

/// How much of an execution the audit trail should capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    None,
    #[default]
    Basic,
    Detailed,
    Full,
}

/// Declared request budget for a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRateLimit {
    pub requests: u32,
    pub window_ms: u64,
}

impl Default for SkillRateLimit {
    fn default() -> Self {
        Self { requests: 100, window_ms: 60_000 }
    }
}

/// Immutable descriptor of a registered skill.
///
/// Serialized in camelCase because policy conditions address its fields by
/// dotted path (e.g. `skill.requiredPermissionLevel`, `skill.destructive`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: SkillCategory,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub required_permission_level: PermissionLevel,
    #[serde(default)]
    pub rate_limit: SkillRateLimit,
    /// Base cost charged per invocation, in the platform's currency unit.
    #[serde(default)]
    pub spending_cost: f64,
    #[serde(default)]
    pub destructive: bool,
    #[serde(default)]
    pub rollback_capable: bool,
    #[serde(default)]
    pub audit_level: AuditLevel,
    /// JSON Schema document the input must satisfy. `None` skips validation.
    #[serde(default)]
    pub input_schema: Option<Value>,
    /// JSON Schema document the output must satisfy. `None` skips validation.
    #[serde(default)]
    pub output_schema: Option<Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Skill {
    /// Start building a descriptor with the given display name.
    pub fn builder(name: impl Into<String>) -> SkillBuilder {
        SkillBuilder::new(name)
    }

    pub fn is_admin(&self) -> bool {
        self.category == SkillCategory::Admin
    }
}

/// Fluent builder producing an immutable [`Skill`].
///
/// ```rust,ignore
/// let skill = Skill::builder("Booking Assistant")
///     .id("booking-assistant")
///     .category(SkillCategory::Customer)
///     .permission_level(PermissionLevel::Suggest)
///     .input_schema(json!({ "type": "object" }))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct SkillBuilder {
    skill: Skill,
}

impl SkillBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            skill: Skill {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.into(),
                description: String::new(),
                category: SkillCategory::Customer,
                version: default_version(),
                permissions: Vec::new(),
                required_permission_level: PermissionLevel::Read,
                rate_limit: SkillRateLimit::default(),
                spending_cost: 0.0,
                destructive: false,
                rollback_capable: false,
                audit_level: AuditLevel::default(),
                input_schema: None,
                output_schema: None,
            },
        }
    }

    /// Override the generated UUID with a stable id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.skill.id = id.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.skill.description = description.into();
        self
    }

    pub fn category(mut self, category: SkillCategory) -> Self {
        self.skill.category = category;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.skill.version = version.into();
        self
    }

    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skill.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn permission_level(mut self, level: PermissionLevel) -> Self {
        self.skill.required_permission_level = level;
        self
    }

    pub fn rate_limit(mut self, requests: u32, window_ms: u64) -> Self {
        self.skill.rate_limit = SkillRateLimit { requests, window_ms };
        self
    }

    pub fn spending_cost(mut self, cost: f64) -> Self {
        self.skill.spending_cost = cost;
        self
    }

    /// Mark the skill as destructive. Default policies route these through approval.
    pub fn destructive(mut self) -> Self {
        self.skill.destructive = true;
        self
    }

    pub fn rollback_capable(mut self) -> Self {
        self.skill.rollback_capable = true;
        self
    }

    pub fn audit_level(mut self, level: AuditLevel) -> Self {
        self.skill.audit_level = level;
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.skill.input_schema = Some(schema);
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.skill.output_schema = Some(schema);
        self
    }

    pub fn build(self) -> Skill {
        self.skill
    }
}
