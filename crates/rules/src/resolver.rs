//! Conflict resolution: turns the set of matched rules into an ordered
//! execution plan of `(rule, action)` pairs.
//!
//! Priority governs ordering only. Every matched rule contributes all of its
//! actions; within a priority band the rule store's listing order is kept
//! (stable sort), so identical inputs always produce the identical plan.
//! Actions sharing `(type, config)` across rules are reported as conflicts
//! here and suppressed later by the dispatcher's idempotency check.

use std::collections::BTreeMap;

use followup_core::{Action, ActionType, Priority, Rule, RuleId};
use serde::{Deserialize, Serialize};

/// One step of the execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub priority: Priority,
    /// Position of the action within its rule's action list.
    pub action_index: usize,
    pub action: Action,
}

/// Planned actions (by plan position) that carry identical `(type, config)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConflict {
    pub action_type: ActionType,
    pub config: String,
    /// Plan positions, ascending. The first entry is the one that will run.
    pub positions: Vec<usize>,
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub plan: Vec<PlannedAction>,
    pub conflicts: Vec<ActionConflict>,
}

/// Order matched rules by priority (high first, stable) and flatten their actions.
pub fn resolve(matched: &[Rule]) -> Resolution {
    let mut ordered: Vec<&Rule> = matched.iter().filter(|r| r.enabled).collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.priority.rank()));

    let plan: Vec<PlannedAction> = ordered
        .iter()
        .flat_map(|rule| {
            rule.actions
                .iter()
                .enumerate()
                .map(move |(action_index, action)| PlannedAction {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    priority: rule.priority,
                    action_index,
                    action: action.clone(),
                })
        })
        .collect();

    let conflicts = detect_conflicts(&plan);
    Resolution { plan, conflicts }
}

fn detect_conflicts(plan: &[PlannedAction]) -> Vec<ActionConflict> {
    let mut groups: BTreeMap<(ActionType, String), Vec<usize>> = BTreeMap::new();
    for (pos, step) in plan.iter().enumerate() {
        groups
            .entry((step.action.kind(), step.action.canonical_config()))
            .or_default()
            .push(pos);
    }

    let mut conflicts: Vec<ActionConflict> = groups
        .into_iter()
        .filter(|(_, positions)| positions.len() > 1)
        .map(|((action_type, config), positions)| ActionConflict {
            action_type,
            config,
            positions,
        })
        .collect();
    conflicts.sort_by_key(|c| c.positions[0]);
    conflicts
}

// ── Tests ───────────────────────────────────────────────────────────
