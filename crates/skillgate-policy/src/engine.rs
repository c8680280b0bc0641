//! Rule-based policy engine implementation.
//!
//! `RulePolicyEngine` holds a hot-swappable rule set and the approval
//! workflows its `require_approval` rules open, and implements the
//! `PolicyEngine` trait from skillgate-core.
//!
//! Evaluation algorithm:
//!
//! 1. Build the evaluation document: the serialized `ExecutionContext`
//!    plus `skill`, `input`, `spendingAmount`, `currentHour` (UTC hour of
//!    `context.timestamp`) and `rateLimitExceeded`.
//! 2. Collect the rules that apply to the skill id and order them by
//!    ascending priority.
//! 3. The first rule whose conditions all hold decides:
//!    a. `deny` → `Err(PolicyViolation)`.
//!    b. `require_approval` → open a workflow, return an approval decision.
//!    c. `allow` → allowed, lower-priority rules are not consulted.
//! 4. If no rule matched → allowed.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Timelike, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use skillgate_contracts::{
    approval::{ApprovalOutcome, ApprovalWorkflow},
    context::ExecutionContext,
    error::{GovernanceError, GovernanceResult},
    policy::{Effect, PolicyDecision, PolicyRule, PolicyStatistics},
    skill::Skill,
};
use skillgate_core::traits::{DiagnosticSink, PolicyEngine, RateLimiter, TracingDiagnostics, Unlimited};

use crate::{
    condition::ConditionEvaluator,
    risk,
    rule::{PolicyConfig, PolicyEngineConfig, RuleStore},
    workflow::{open_workflow, ApprovalRequest, ApprovalWorkflowManager},
};

/// The rule set shipped with skillgate.
pub const DEFAULT_POLICIES: &str = include_str!("../policies/default.toml");

/// A `PolicyEngine` driven by prioritised condition rules.
///
/// ```rust,ignore
/// use skillgate_policy::RulePolicyEngine;
///
/// let engine = RulePolicyEngine::with_default_policies()?
///     .with_rate_limiter(Arc::new(MyLimiter::new()));
/// ```
pub struct RulePolicyEngine {
    config: PolicyEngineConfig,
    rules: RwLock<RuleStore>,
    workflows: ApprovalWorkflowManager,
    rate_limiter: Arc<dyn RateLimiter>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl RulePolicyEngine {
    /// An engine with no rules. Every request is allowed until rules are added.
    pub fn new(config: PolicyEngineConfig) -> Self {
        Self {
            config,
            rules: RwLock::new(RuleStore::new()),
            workflows: ApprovalWorkflowManager::new(),
            rate_limiter: Arc::new(Unlimited),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// An engine loaded with [`DEFAULT_POLICIES`].
    pub fn with_default_policies() -> GovernanceResult<Self> {
        Self::from_toml_str(DEFAULT_POLICIES)
    }

    /// Parse `s` as a policy TOML document.
    ///
    /// Returns `GovernanceError::ConfigError` if the TOML is malformed, does
    /// not match `PolicyConfig`, or contains an uncompilable action pattern.
    pub fn from_toml_str(s: &str) -> GovernanceResult<Self> {
        let config: PolicyConfig = toml::from_str(s).map_err(|e| GovernanceError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;

        let engine = Self::new(config.engine);
        {
            let mut store = engine.store_mut();
            for rule in config.rules {
                store.insert(rule)?;
            }
            info!(rules = store.len(), "policy rules loaded");
        }
        Ok(engine)
    }

    /// Read the file at `path` and parse it as a policy TOML document.
    pub fn from_file(path: &Path) -> GovernanceResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GovernanceError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &PolicyEngineConfig {
        &self.config
    }

    fn store(&self) -> RwLockReadGuard<'_, RuleStore> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_mut(&self) -> RwLockWriteGuard<'_, RuleStore> {
        self.rules.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Rule administration ──────────────────────────────────────────────────

    /// Add `rule`, replacing any existing rule with the same id.
    pub fn add_policy(&self, rule: PolicyRule) -> GovernanceResult<()> {
        let id = rule.id.clone();
        let effect = rule.effect;
        self.store_mut().insert(rule)?;
        info!(policy_id = %id, effect = %effect, "policy added");
        Ok(())
    }

    /// Remove the rule with `id`. Returns whether one existed.
    pub fn remove_policy(&self, id: &str) -> bool {
        let removed = self.store_mut().remove(id);
        if removed {
            info!(policy_id = %id, "policy removed");
        }
        removed
    }

    /// Snapshot of every loaded rule, ordered by priority then id.
    pub fn policies(&self) -> Vec<PolicyRule> {
        let mut rules: Vec<PolicyRule> = self.store().iter().cloned().collect();
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        rules
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    /// Evaluate with an explicit clock for workflow timelines.
    pub fn evaluate_at(
        &self,
        skill: &Skill,
        context: &ExecutionContext,
        input: &Value,
        now: DateTime<Utc>,
    ) -> GovernanceResult<PolicyDecision> {
        let document = self.evaluation_document(skill, context, input)?;
        let rules = self.store().applicable(&skill.id);
        let evaluator = ConditionEvaluator::new(self.diagnostics.as_ref());

        debug!(
            skill_id = %skill.id,
            user_id = %context.user_id,
            candidates = rules.len(),
            "evaluating policy"
        );

        let Some(rule) = rules.iter().find(|r| evaluator.all(&r.conditions, &document)) else {
            debug!(skill_id = %skill.id, "no rule matched; allowed by default");
            return Ok(PolicyDecision::allow());
        };

        match rule.effect {
            Effect::Deny => {
                warn!(skill_id = %skill.id, policy_id = %rule.id, "policy denied request");
                Err(GovernanceError::PolicyViolation {
                    policy_id: rule.id.clone(),
                    action: skill.id.clone(),
                    reason: rule.metadata.reason.clone(),
                })
            }
            Effect::RequireApproval => {
                let workflow = open_workflow(
                    ApprovalRequest {
                        skill,
                        context,
                        input,
                        policy_id: &rule.id,
                        reason: &rule.metadata.reason,
                        approver_role: rule
                            .metadata
                            .approver
                            .as_deref()
                            .unwrap_or(&self.config.default_approver),
                        timeout_minutes: rule
                            .metadata
                            .timeout_minutes
                            .unwrap_or(self.config.default_timeout_minutes),
                        risk_score: risk::risk_score(skill, context, input, &self.config.home_geofence),
                    },
                    now,
                );
                let workflow_id = self.workflows.insert(workflow);
                info!(
                    skill_id = %skill.id,
                    policy_id = %rule.id,
                    workflow_id = %workflow_id,
                    "approval workflow opened"
                );
                Ok(PolicyDecision::approval(workflow_id, rule.metadata.reason.clone()))
            }
            Effect::Allow => {
                debug!(skill_id = %skill.id, policy_id = %rule.id, "allowed by rule");
                Ok(PolicyDecision::allow())
            }
        }
    }

    fn evaluation_document(
        &self,
        skill: &Skill,
        context: &ExecutionContext,
        input: &Value,
    ) -> GovernanceResult<Value> {
        let to_value = |what: &str, v: serde_json::Result<Value>| {
            v.map_err(|e| GovernanceError::ConfigError {
                reason: format!("failed to serialize {what} for policy evaluation: {e}"),
            })
        };

        let mut document = match to_value("context", serde_json::to_value(context))? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        document.insert("skill".into(), to_value("skill", serde_json::to_value(skill))?);
        document.insert("input".into(), input.clone());
        document.insert("spendingAmount".into(), Value::from(risk::spending_amount(skill, input)));
        document.insert("currentHour".into(), Value::from(context.timestamp.hour()));
        document.insert(
            "rateLimitExceeded".into(),
            Value::Bool(self.rate_limiter.is_exceeded(context, skill)),
        );
        Ok(Value::Object(document))
    }

    // ── Workflows ────────────────────────────────────────────────────────────

    /// Append an approval step to a pending workflow. Returns the new step id.
    pub fn add_approval_step(
        &self,
        workflow_id: &str,
        approver_role: &str,
        timeout_minutes: u32,
    ) -> GovernanceResult<String> {
        self.workflows.add_step(workflow_id, approver_role, timeout_minutes)
    }
}

impl PolicyEngine for RulePolicyEngine {
    fn evaluate(
        &self,
        skill: &Skill,
        context: &ExecutionContext,
        input: &Value,
    ) -> GovernanceResult<PolicyDecision> {
        self.evaluate_at(skill, context, input, Utc::now())
    }

    fn approval_status(&self, workflow_id: &str) -> Option<ApprovalWorkflow> {
        self.workflows.get(workflow_id)
    }

    fn process_approval(
        &self,
        workflow_id: &str,
        step_id: &str,
        approved: bool,
        approver: &str,
        rationale: Option<&str>,
    ) -> GovernanceResult<ApprovalOutcome> {
        self.workflows
            .process_at(workflow_id, step_id, approved, approver, rationale, Utc::now())
    }

    fn claim_approved(&self, workflow_id: &str) -> GovernanceResult<ApprovalWorkflow> {
        self.workflows.claim_approved_at(workflow_id, Utc::now())
    }

    fn release_claim(&self, workflow_id: &str) {
        self.workflows.release_claim(workflow_id);
    }

    fn cleanup_expired_workflows(&self, now: DateTime<Utc>) -> usize {
        self.workflows.expire_at(now)
    }

    fn statistics(&self) -> PolicyStatistics {
        let mut stats = PolicyStatistics::default();
        {
            let store = self.store();
            stats.total_policies = store.len();
            for rule in store.iter() {
                *stats.policies_by_effect.entry(rule.effect.to_string()).or_insert(0) += 1;
            }
        }
        let (active, expired) = self.workflows.counts();
        stats.active_workflows = active;
        stats.expired_workflows = expired;
        stats
    }
}
