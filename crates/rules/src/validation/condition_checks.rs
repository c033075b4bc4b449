//! Per-condition checks: field type, operator, legal values.

use followup_core::{Condition, ConditionField, Operator, FIELD_NAMES};

use super::fuzzy::fuzzy_match;
use super::ValidationResult;

const OPERATORS: &[&str] = &["equals", "not_equals", "contains"];

pub(super) fn validate_condition(condition: &Condition, path: &str, result: &mut ValidationResult) {
    if condition.value.is_empty() {
        result.error(format!("{path}.value"), "condition value must not be empty");
    }

    if let ConditionField::Unknown(name) = &condition.field {
        result.warn_with_suggestion(
            format!("{path}.type"),
            format!("unknown condition type '{name}'; the condition will never match"),
            fuzzy_match(name, FIELD_NAMES),
        );
        return;
    }

    if let Operator::Unknown(name) = &condition.operator {
        result.warn_with_suggestion(
            format!("{path}.operator"),
            format!("unknown operator '{name}'; the condition will never match"),
            fuzzy_match(name, OPERATORS),
        );
        return;
    }

    if condition.operator == Operator::Contains || condition.value.is_empty() {
        return;
    }

    match condition.field.legal_values() {
        Some(legal) => {
            if !legal.contains(&condition.value.as_str()) {
                result.warn_with_suggestion(
                    format!("{path}.value"),
                    format!(
                        "'{}' is not a legal {} value (expected one of: {})",
                        condition.value,
                        condition.field,
                        legal.join(", ")
                    ),
                    fuzzy_match(&condition.value, legal),
                );
            }
        }
        None if condition.field == ConditionField::Duration => {
            if condition.value.parse::<u64>().is_err() {
                result.warn(
                    format!("{path}.value"),
                    format!(
                        "duration is compared in whole seconds, got '{}'",
                        condition.value
                    ),
                );
            }
        }
        None => {}
    }
}
