//! The record produced by one evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use followup_actions::DispatchOutcome;
use followup_core::{Action, ActionType, Priority, RuleId};
use followup_rules::resolver::{ActionConflict, PlannedAction};

/// A rule whose conditions all matched the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRule {
    pub rule_id: RuleId,
    pub name: String,
    pub priority: Priority,
}

/// One planned action and what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub rule_id: RuleId,
    pub rule_name: String,
    /// Position of the action within its rule.
    pub action_index: usize,
    pub action: Action,
    pub idempotency_key: String,
    pub outcome: DispatchOutcome,
}

impl ActionRecord {
    pub fn action_type(&self) -> ActionType {
        self.action.kind()
    }
}

/// Engine-internal faults that were contained during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationError {
    /// Active rules could not be read; nothing matched.
    StoreUnavailable { message: String },
    /// Condition evaluation panicked for one rule; the rule was skipped.
    RulePanicked { rule_id: RuleId },
}

/// Dry-run output: what an evaluation would dispatch, without dispatching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub event_id: String,
    pub matched_rules: Vec<MatchedRule>,
    /// Planned actions in execution order.
    pub plan: Vec<PlannedAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ActionConflict>,
    /// Faults that may have hidden matches, e.g. an unreadable store.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EvaluationError>,
}

/// Audit record for one event. Immutable once returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub event_id: String,
    pub evaluated_at: DateTime<Utc>,
    /// Matched rules in store listing order.
    pub matched_rules: Vec<MatchedRule>,
    /// Every planned action in execution order, with its outcome.
    pub dispatched_actions: Vec<ActionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ActionConflict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EvaluationError>,
    pub duration_ms: u64,
}

impl EvaluationResult {
    pub fn matched_ids(&self) -> Vec<&RuleId> {
        self.matched_rules.iter().map(|m| &m.rule_id).collect()
    }

    pub fn action_types(&self) -> Vec<ActionType> {
        self.dispatched_actions.iter().map(|a| a.action_type()).collect()
    }

    pub fn outcomes(&self) -> Vec<&DispatchOutcome> {
        self.dispatched_actions.iter().map(|a| &a.outcome).collect()
    }

    pub fn count(&self, pred: impl Fn(&DispatchOutcome) -> bool) -> usize {
        self.dispatched_actions.iter().filter(|a| pred(&a.outcome)).count()
    }
}
