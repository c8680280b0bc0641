//! JSON Schema validator for the skillgate runtime.
//!
//! `JsonSchemaValidator` implements the `SchemaValidator` trait from
//! `skillgate-core`. Every violation is collected before returning so callers
//! see the full failure set in one pass.
//!
//! Compiled schemas are cached by their serialized form. Skills are
//! registered once and validated on every job, so each schema document is
//! compiled at most once per validator.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, warn};

use skillgate_contracts::{
    error::{GovernanceError, GovernanceResult},
    validation::{ValidationFailure, ValidationReport},
};
use skillgate_core::traits::SchemaValidator;

/// The skillgate schema validator.
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: RwLock<HashMap<String, Arc<Validator>>>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct schema documents compiled so far.
    pub fn cached_schemas(&self) -> usize {
        self.compiled.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn compile(&self, schema: &Value) -> GovernanceResult<Arc<Validator>> {
        let key = schema.to_string();
        if let Some(validator) = self.compiled.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(validator));
        }

        let validator = jsonschema::validator_for(schema).map_err(|e| {
            warn!(error = %e, "schema compilation failure");
            GovernanceError::SchemaValidation { reason: format!("invalid JSON Schema document: {e}") }
        })?;
        let validator = Arc::new(validator);

        self.compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&validator));
        Ok(validator)
    }
}

impl SchemaValidator for JsonSchemaValidator {
    /// Validate `instance` against `schema`.
    ///
    /// A null schema means "no structural constraint" and always passes. A
    /// schema that cannot be compiled is an `Err(SchemaValidation)`, which the
    /// kernel reports as a validation error.
    fn validate(&self, schema: &Value, instance: &Value) -> GovernanceResult<ValidationReport> {
        if schema.is_null() {
            return Ok(ValidationReport::pass());
        }

        let validator = self.compile(schema)?;
        let failures: Vec<ValidationFailure> = validator
            .iter_errors(instance)
            .map(|error| ValidationFailure {
                path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        debug!(passed = failures.is_empty(), failure_count = failures.len(), "schema validation complete");
        Ok(ValidationReport::from_failures(failures))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
