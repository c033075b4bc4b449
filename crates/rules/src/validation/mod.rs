//! Rule validation with structured errors and suggestions.
//!
//! Errors block a store write; warnings are advisory. A rule with an
//! unknown condition type or operator is still storable (it fails closed at
//! evaluation), but it is flagged so the builder UI can surface it.

mod condition_checks;
pub(crate) mod fuzzy;

use std::fmt;

use followup_core::RuleDraft;
use serde::{Deserialize, Serialize};

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// JSON-path-like location, e.g. `"conditions[1].value"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn warn_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
            suggestion: suggestion.map(|s| format!("did you mean '{s}'?")),
        });
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a rule draft (or a rule's editable fields via [`Rule::to_draft`]).
///
/// [`Rule::to_draft`]: followup_core::Rule::to_draft
pub fn validate_rule(draft: &RuleDraft) -> ValidationResult {
    let mut result = ValidationResult::new();

    if draft.name.trim().is_empty() {
        result.error("name", "name must not be blank");
    }
    if draft.conditions.is_empty() {
        result.error("conditions", "a rule needs at least one condition");
    }
    if draft.actions.is_empty() {
        result.error("actions", "a rule needs at least one action");
    }

    for (i, condition) in draft.conditions.iter().enumerate() {
        condition_checks::validate_condition(condition, &format!("conditions[{i}]"), &mut result);
    }

    result
}
