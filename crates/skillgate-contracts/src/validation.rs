//! Schema validation reports.
//!
//! The kernel validates every input before it reaches an executor and every
//! output before it is returned. Only a passing `ValidationReport` lets the
//! job proceed.

use serde::{Deserialize, Serialize};

/// The result of checking one document against one schema.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True only if no failures were found.
    pub passed: bool,
    pub failures: Vec<ValidationFailure>,
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// JSON pointer into the validated document, empty for the root.
    pub path: String,
    pub message: String,
}

impl ValidationReport {
    pub fn pass() -> Self {
        Self { passed: true, failures: Vec::new() }
    }

    pub fn from_failures(failures: Vec<ValidationFailure>) -> Self {
        Self { passed: failures.is_empty(), failures }
    }

    /// All failures joined into one line, for error messages.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| {
                if f.path.is_empty() {
                    f.message.clone()
                } else {
                    format!("{}: {}", f.path, f.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
