//! Rule persistence.
//!
//! [`RuleStore`] is the seam between the engine and whatever keeps rules
//! durable. Two implementations ship here:
//! - [`InMemoryRuleStore`]: an ordered map behind a `RwLock`
//! - [`JsonFileRuleStore`]: the same map, written through to a single JSON file
//!
//! Every write validates the rule first; listings come back in creation order.

mod error;
mod file;
mod memory;

pub use self::error::{Result, StoreError};
pub use self::file::JsonFileRuleStore;
pub use self::memory::InMemoryRuleStore;

use followup_core::{Rule, RuleDraft, RuleId};

/// Keyed rule storage shared by the builder UI, the suggestion ingestor and
/// the engine. Implementations must allow concurrent reads and serialize writes.
pub trait RuleStore: Send + Sync {
    /// Validate and persist a new rule, returning it as stored.
    fn create_rule(&self, draft: RuleDraft) -> Result<Rule>;

    /// Validate and persist a new rule, returning its generated id.
    fn create(&self, draft: RuleDraft) -> Result<RuleId> {
        self.create_rule(draft).map(|rule| rule.id)
    }

    /// Replace the editable fields of an existing rule.
    fn update(&self, id: &RuleId, draft: RuleDraft) -> Result<Rule>;

    fn delete(&self, id: &RuleId) -> Result<()>;

    fn get(&self, id: &RuleId) -> Result<Option<Rule>>;

    /// Every rule, in creation order.
    fn list(&self) -> Result<Vec<Rule>>;

    /// Enabled rules only, in creation order.
    fn list_active(&self) -> Result<Vec<Rule>> {
        Ok(self.list()?.into_iter().filter(|r| r.enabled).collect())
    }

    /// Flip a rule's `enabled` flag without touching anything else.
    fn set_enabled(&self, id: &RuleId, enabled: bool) -> Result<Rule> {
        let rule = self.get(id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut draft = rule.to_draft();
        draft.enabled = enabled;
        self.update(id, draft)
    }
}
