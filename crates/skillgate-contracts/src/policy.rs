//! Policy rule and admission decision types.
//!
//! The policy engine consumes a skill, an `ExecutionContext` and the raw input,
//! and produces a `PolicyDecision`. Rules are plain data so they can be loaded
//! from TOML and hot-swapped at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a matching rule does to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
    RequireApproval,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
            Effect::RequireApproval => "require_approval",
        };
        f.write_str(s)
    }
}

/// Comparison applied by a single condition.
///
/// Unrecognised operator names are preserved in `Unknown` rather than failing
/// deserialization; the evaluator treats them as a non-match and reports them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Contains,
    Regex,
    Unknown(String),
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "gte" => Operator::Gte,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "regex" => Operator::Regex,
            _ => Operator::Unknown(s),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::Regex => "regex",
            Operator::Unknown(name) => name,
        }
    }
}

/// One field-level predicate. A rule's conditions are AND-ed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the evaluation document, e.g. `skill.category`.
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self { field: field.into(), operator, value }
    }
}

/// Explanatory and workflow parameters attached to a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMetadata {
    /// Written to decisions, errors and audit entries.
    pub reason: String,
    /// Role that must sign off when `effect = "require_approval"`.
    #[serde(default)]
    pub approver: Option<String>,
    /// Approval deadline; the engine default applies when absent.
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

/// A single admission rule.
///
/// ```toml
/// [[rules]]
/// id = "financial-high-value"
/// name = "High Value Transaction Approval"
/// action = "*"
/// effect = "require_approval"
/// priority = 1
///
/// [rules.metadata]
/// reason = "High value transactions require approval"
/// approver = "admin"
/// timeout_minutes = 30
///
/// [[rules.conditions]]
/// field = "spendingAmount"
/// operator = "gt"
/// value = 50000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Exact skill id, or a glob (`*` any run of characters, `?` one character).
    pub action: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub effect: Effect,
    /// Lower values are evaluated first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub metadata: RuleMetadata,
}

fn default_priority() -> i32 {
    100
}

impl PolicyRule {
    /// Build an unconditional rule; add conditions with [`PolicyRule::when`].
    pub fn new(
        id: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
        priority: i32,
        reason: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            action: action.into(),
            conditions: Vec::new(),
            effect,
            priority,
            metadata: RuleMetadata { reason: reason.into(), ..RuleMetadata::default() },
        }
    }

    pub fn when(mut self, field: impl Into<String>, operator: Operator, value: Value) -> Self {
        self.conditions.push(Condition::new(field, operator, value));
        self
    }

    pub fn with_approver(mut self, approver: impl Into<String>, timeout_minutes: u32) -> Self {
        self.metadata.approver = Some(approver.into());
        self.metadata.timeout_minutes = Some(timeout_minutes);
        self
    }

    /// True when `action` contains glob metacharacters.
    pub fn is_pattern(&self) -> bool {
        self.action.contains('*') || self.action.contains('?')
    }
}

/// The admission verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub allowed: bool,
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violated_policies: Vec<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self { allowed: true, ..Self::default() }
    }

    pub fn approval(workflow_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_approval: true,
            workflow_id: Some(workflow_id.into()),
            reason: Some(reason.into()),
            violated_policies: Vec::new(),
        }
    }

    pub fn deny(policy_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_approval: false,
            workflow_id: None,
            reason: Some(reason.into()),
            violated_policies: vec![policy_id.into()],
        }
    }
}

/// Counters reported by a policy engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatistics {
    pub total_policies: usize,
    pub policies_by_effect: std::collections::BTreeMap<String, usize>,
    pub active_workflows: usize,
    pub expired_workflows: usize,
}
