//! Condition evaluation against a JSON evaluation document.
//!
//! A rule's conditions are a conjunction. Each condition looks up a
//! dot-separated path in the document; a path that does not resolve makes
//! the condition false whatever the operator.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::Value;

use skillgate_contracts::policy::{Condition, Operator};
use skillgate_core::traits::DiagnosticSink;

pub struct ConditionEvaluator<'a> {
    diagnostics: &'a dyn DiagnosticSink,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(diagnostics: &'a dyn DiagnosticSink) -> Self {
        Self { diagnostics }
    }

    /// True when every condition holds. An empty list holds.
    pub fn all(&self, conditions: &[Condition], document: &Value) -> bool {
        conditions.iter().all(|c| self.holds(c, document))
    }

    pub fn holds(&self, condition: &Condition, document: &Value) -> bool {
        if let Operator::Unknown(name) = &condition.operator {
            self.diagnostics
                .warn(&format!("unknown operator '{name}' on field '{}'", condition.field));
            return false;
        }
        let Some(actual) = lookup(document, &condition.field) else {
            return false;
        };
        let expected = &condition.value;

        match &condition.operator {
            Operator::Eq => loosely_equal(actual, expected),
            Operator::Ne => !loosely_equal(actual, expected),
            Operator::Gt => compare(actual, expected) == Some(Ordering::Greater),
            Operator::Lt => compare(actual, expected) == Some(Ordering::Less),
            Operator::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
            Operator::In => match expected {
                Value::Array(items) => items.iter().any(|item| loosely_equal(actual, item)),
                _ => false,
            },
            Operator::NotIn => match expected {
                Value::Array(items) => !items.iter().any(|item| loosely_equal(actual, item)),
                _ => false,
            },
            Operator::Contains => match (actual, expected) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                _ => false,
            },
            Operator::Regex => self.regex_matches(&condition.field, actual, expected),
            Operator::Unknown(_) => false,
        }
    }

    fn regex_matches(&self, field: &str, actual: &Value, pattern: &Value) -> bool {
        let Value::String(pattern) = pattern else {
            self.diagnostics.warn(&format!("regex condition on '{field}' has a non-string pattern"));
            return false;
        };
        let subject = match actual {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return false,
        };
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(&subject),
            Err(e) => {
                self.diagnostics.warn(&format!("invalid regex '{pattern}' on field '{field}': {e}"));
                false
            }
        }
    }
}

/// Resolve a dot-separated path. Numeric segments index into arrays.
pub fn lookup<'v>(document: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(document, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Equality that treats `5` and `5.0` as the same number.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Numbers compare numerically, strings lexicographically, anything else not at all.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
