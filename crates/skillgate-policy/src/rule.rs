//! Rule storage, glob matching and the TOML configuration schema.
//!
//! Rules whose `action` contains `*` or `?` are pattern rules and apply to
//! every skill id the glob matches (case-insensitive, whole id). All other
//! rules apply to exactly one skill id. Applicable rules are returned
//! pattern rules first, then exact rules, stably sorted by ascending priority.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use skillgate_contracts::{
    error::{GovernanceError, GovernanceResult},
    policy::PolicyRule,
};

/// Engine-wide parameters, optionally given in the `[engine]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyEngineConfig {
    /// Requests from any other geofence score higher risk.
    pub home_geofence: String,
    /// Approver role when a rule names none.
    pub default_approver: String,
    /// Approval deadline when a rule gives none.
    pub default_timeout_minutes: u32,
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self {
            home_geofence: "nepal".to_string(),
            default_approver: "admin".to_string(),
            default_timeout_minutes: 60,
        }
    }
}

/// Top-level shape of a policy TOML document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub engine: PolicyEngineConfig,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

/// Compile a glob into an anchored, case-insensitive regex.
pub fn compile_glob(pattern: &str) -> GovernanceResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|e| GovernanceError::ConfigError {
            reason: format!("invalid action pattern '{pattern}': {e}"),
        })
}

#[derive(Debug, Clone)]
struct PatternRule {
    matcher: Regex,
    rule: PolicyRule,
}

/// Pattern-keyed and exact-keyed rules.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    patterns: Vec<PatternRule>,
    exact: HashMap<String, Vec<PolicyRule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `rule`, replacing any rule with the same id.
    pub fn insert(&mut self, rule: PolicyRule) -> GovernanceResult<()> {
        let pattern = if rule.is_pattern() { Some(compile_glob(&rule.action)?) } else { None };
        self.remove(&rule.id);

        match pattern {
            Some(matcher) => self.patterns.push(PatternRule { matcher, rule }),
            None => self.exact.entry(rule.action.clone()).or_default().push(rule),
        }
        Ok(())
    }

    /// Remove the rule with `id`. Returns whether one was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.len();
        self.patterns.retain(|p| p.rule.id != id);
        for rules in self.exact.values_mut() {
            rules.retain(|r| r.id != id);
        }
        self.exact.retain(|_, rules| !rules.is_empty());
        self.len() != before
    }

    /// Rules that apply to `action`, in evaluation order.
    pub fn applicable(&self, action: &str) -> Vec<PolicyRule> {
        let mut rules: Vec<PolicyRule> = self
            .patterns
            .iter()
            .filter(|p| p.matcher.is_match(action))
            .map(|p| p.rule.clone())
            .collect();
        if let Some(exact) = self.exact.get(action) {
            rules.extend(exact.iter().cloned());
        }
        rules.sort_by_key(|r| r.priority);
        rules
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolicyRule> {
        self.patterns.iter().map(|p| &p.rule).chain(self.exact.values().flatten())
    }

    pub fn len(&self) -> usize {
        self.patterns.len() + self.exact.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
