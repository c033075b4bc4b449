//! Rule definitions: conditions, priority, drafts and stored rules.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;
use crate::event::ConditionField;

/// Opaque rule identifier, generated by the rule store at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rule priority. Orders execution only; it never suppresses other rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Higher rank runs first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Comparison operator. Unrecognized names deserialize to
/// [`Operator::Unknown`], which never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::Unknown(name) => name,
        }
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "contains" => Operator::Contains,
            _ => Operator::Unknown(s),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single predicate over one event field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub field: ConditionField,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    pub fn new(field: ConditionField, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
        }
    }

    pub fn equals(field: ConditionField, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Equals, value)
    }
}

/// A rule as submitted by the builder UI or the suggestion pipeline:
/// everything except the store-assigned id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Priority,
}

fn default_true() -> bool {
    true
}

impl RuleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            conditions: Vec::new(),
            actions: Vec::new(),
            enabled: true,
            priority: Priority::default(),
        }
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A persisted automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub enabled: bool,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Materialize a draft with the given identity and timestamps.
    pub fn from_draft(id: RuleId, draft: RuleDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            conditions: draft.conditions,
            actions: draft.actions,
            enabled: draft.enabled,
            priority: draft.priority,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an edited draft, keeping id and `created_at`.
    pub fn apply(&mut self, draft: RuleDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.description = draft.description;
        self.conditions = draft.conditions;
        self.actions = draft.actions;
        self.enabled = draft.enabled;
        self.priority = draft.priority;
        self.updated_at = now;
    }

    pub fn to_draft(&self) -> RuleDraft {
        RuleDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            conditions: self.conditions.clone(),
            actions: self.actions.clone(),
            enabled: self.enabled,
            priority: self.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionType, CreateTaskConfig};

    const DRAFT_YAML: &str = r#"
name: Negative voice follow-up
description: Open a task when a voice call ends badly
priority: high
conditions:
  - type: sentiment
    operator: equals
    value: negative
  - type: channel
    operator: equals
    value: voice
actions:
  - type: create_task
    config:
      title: Call the customer back
      due_in_hours: 24
"#;

    #[test]
    fn parse_draft_yaml() {
        let draft: RuleDraft = serde_yaml::from_str(DRAFT_YAML).unwrap();
        assert_eq!(draft.name, "Negative voice follow-up");
        assert_eq!(draft.priority, Priority::High);
        assert!(draft.enabled);
        assert_eq!(draft.conditions.len(), 2);
        assert_eq!(draft.conditions[0].field, ConditionField::Sentiment);
        assert_eq!(draft.conditions[1].operator, Operator::Equals);
        assert_eq!(draft.actions[0].kind(), ActionType::CreateTask);
        assert_eq!(
            draft.actions[0],
            Action::CreateTask(CreateTaskConfig {
                title: Some("Call the customer back".to_string()),
                assignee: None,
                due_in_hours: Some(24),
            })
        );
    }

    #[test]
    fn unknown_operator_is_kept() {
        let condition: Condition = serde_json::from_str(
            r#"{"type": "sentiment", "operator": "greater_than", "value": "negative"}"#,
        )
        .unwrap();
        assert_eq!(condition.operator, Operator::Unknown("greater_than".to_string()));
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn apply_keeps_identity() {
        let created = Utc::now();
        let draft: RuleDraft = serde_yaml::from_str(DRAFT_YAML).unwrap();
        let mut rule = Rule::from_draft(RuleId::from("r1"), draft.clone(), created);

        let later = created + chrono::Duration::seconds(5);
        rule.apply(draft.priority(Priority::Low).enabled(false), later);

        assert_eq!(rule.id.as_str(), "r1");
        assert_eq!(rule.created_at, created);
        assert_eq!(rule.updated_at, later);
        assert_eq!(rule.priority, Priority::Low);
        assert!(!rule.enabled);
    }
}
