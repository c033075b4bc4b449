//! Boundary for AI-suggested rules.
//!
//! Suggestions arrive as [`RuleDraft`]s from an external text-generation
//! pipeline. They are validated like any other rule and always stored
//! disabled; only a human approving them (via [`RuleStore::set_enabled`])
//! makes them live.

use std::sync::Arc;

use tracing::{info, warn};

use followup_core::{Rule, RuleDraft};

use crate::store::{RuleStore, StoreError};
use crate::validation::{validate_rule, ValidationResult};

/// A draft that was not persisted, with the reason.
#[derive(Debug)]
pub struct Rejected {
    /// Position of the draft in the submitted batch.
    pub index: usize,
    pub name: String,
    pub error: StoreError,
}

/// Full outcome of one ingest batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub accepted: Vec<Rule>,
    pub rejected: Vec<Rejected>,
}

/// Inserts suggested rules into a [`RuleStore`] as disabled drafts.
#[derive(Clone)]
pub struct SuggestionIngestor {
    store: Arc<dyn RuleStore>,
}

impl SuggestionIngestor {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Persist every valid draft with `enabled = false`; invalid drafts are dropped.
    pub fn ingest(&self, drafts: Vec<RuleDraft>) -> Vec<Rule> {
        self.ingest_with_report(drafts).accepted
    }

    /// Like [`ingest`](Self::ingest), but also returns what was dropped and why.
    pub fn ingest_with_report(&self, drafts: Vec<RuleDraft>) -> IngestReport {
        let mut report = IngestReport::default();

        for (index, mut draft) in drafts.into_iter().enumerate() {
            draft.enabled = false;
            let name = draft.name.clone();

            match self.persist(draft) {
                Ok(rule) => {
                    info!(rule_id = %rule.id, name = %rule.name, "ingested suggested rule as draft");
                    report.accepted.push(rule);
                }
                Err(error) => {
                    warn!(index, name = %name, error = %error, "dropping suggested rule");
                    report.rejected.push(Rejected { index, name, error });
                }
            }
        }

        report
    }

    fn persist(&self, draft: RuleDraft) -> Result<Rule, StoreError> {
        let report: ValidationResult = validate_rule(&draft);
        if !report.valid {
            return Err(StoreError::Validation(report));
        }
        self.store.create_rule(draft)
    }
}
