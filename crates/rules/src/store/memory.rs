//! In-memory reference [`RuleStore`].

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use indexmap::IndexMap;
use tracing::info;

use followup_core::{Rule, RuleDraft, RuleId};

use super::{Result, RuleStore, StoreError};
use crate::validation::validate_rule;

/// Rules kept in an `IndexMap` so iteration follows creation order while
/// lookups by id stay O(1).
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<IndexMap<RuleId, Rule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from already-persisted rules, keeping their ids and order.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let map = rules.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            rules: RwLock::new(map),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexMap<RuleId, Rule>>> {
        self.rules
            .read()
            .map_err(|_| StoreError::Unavailable("rule store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexMap<RuleId, Rule>>> {
        self.rules
            .write()
            .map_err(|_| StoreError::Unavailable("rule store lock poisoned".to_string()))
    }

    /// Validate a draft and materialize it under a fresh id, without storing it.
    pub(crate) fn build(draft: RuleDraft) -> Result<Rule> {
        let report = validate_rule(&draft);
        if !report.valid {
            return Err(StoreError::Validation(report));
        }
        Ok(Rule::from_draft(RuleId::generate(), draft, Utc::now()))
    }

    /// Validate an edit of an existing rule and return the edited copy,
    /// without storing it.
    pub(crate) fn edited(&self, id: &RuleId, draft: RuleDraft) -> Result<Rule> {
        let report = validate_rule(&draft);
        if !report.valid {
            return Err(StoreError::Validation(report));
        }
        let mut rule = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        rule.apply(draft, Utc::now());
        Ok(rule)
    }

    /// Store a rule: appended when new, replaced in place otherwise.
    pub(crate) fn put(&self, rule: Rule) -> Result<()> {
        self.write()?.insert(rule.id.clone(), rule);
        Ok(())
    }

    pub(crate) fn remove(&self, id: &RuleId) -> Result<Rule> {
        self.write()?
            .shift_remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

impl RuleStore for InMemoryRuleStore {
    fn create_rule(&self, draft: RuleDraft) -> Result<Rule> {
        let rule = Self::build(draft)?;
        self.put(rule.clone())?;
        info!(rule_id = %rule.id, name = %rule.name, enabled = rule.enabled, "rule created");
        Ok(rule)
    }

    fn update(&self, id: &RuleId, draft: RuleDraft) -> Result<Rule> {
        let report = validate_rule(&draft);
        if !report.valid {
            return Err(StoreError::Validation(report));
        }
        let mut guard = self.write()?;
        let rule = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        rule.apply(draft, Utc::now());
        info!(rule_id = %id, enabled = rule.enabled, "rule updated");
        Ok(rule.clone())
    }

    fn delete(&self, id: &RuleId) -> Result<()> {
        self.remove(id)?;
        info!(rule_id = %id, "rule deleted");
        Ok(())
    }

    fn get(&self, id: &RuleId) -> Result<Option<Rule>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Rule>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn list_active(&self) -> Result<Vec<Rule>> {
        Ok(self
            .read()?
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }
}
