//! Condition evaluation against interaction events.
//!
//! Evaluation is pure and total: no I/O, no panics on bad input. Anything
//! the evaluator does not recognize (an unknown field, an unknown operator,
//! a field the event does not carry) fails closed and yields `false`.

use followup_core::{Condition, InteractionEvent, Operator, Rule};

/// Evaluate a single condition against an event.
pub fn matches(condition: &Condition, event: &InteractionEvent) -> bool {
    if !condition.field.is_known() {
        return false;
    }

    let Some(actual) = event.field(&condition.field) else {
        return false;
    };

    match &condition.operator {
        Operator::Equals => actual == condition.value.as_str(),
        Operator::NotEquals => actual != condition.value.as_str(),
        Operator::Contains => actual
            .to_lowercase()
            .contains(&condition.value.to_lowercase()),
        Operator::Unknown(_) => false,
    }
}

/// A rule matches when it is enabled, has at least one condition and one
/// action, and every condition matches (AND semantics).
pub fn rule_matches(rule: &Rule, event: &InteractionEvent) -> bool {
    rule.enabled
        && !rule.conditions.is_empty()
        && !rule.actions.is_empty()
        && rule.conditions.iter().all(|c| matches(c, event))
}

// ── Tests ───────────────────────────────────────────────────────────
