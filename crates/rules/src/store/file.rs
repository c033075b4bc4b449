//! File-backed [`RuleStore`]: single JSON file for all rules.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use followup_core::{Rule, RuleDraft, RuleId};

use super::memory::InMemoryRuleStore;
use super::{Result, RuleStore, StoreError};

/// Persists the whole rule set to one JSON file on every write.
///
/// Reads are served from an in-memory copy, so listing rules never waits on
/// disk. Writes are serialized by `persist_lock` and only reach the
/// in-memory copy after the new snapshot is on disk, so readers never see a
/// rule that failed to persist.
pub struct JsonFileRuleStore {
    path: PathBuf,
    cache: InMemoryRuleStore,
    persist_lock: Mutex<()>,
}

impl JsonFileRuleStore {
    /// Open (or create) the store at `path`, loading any existing rules.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let rules: Vec<Rule> = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            Vec::new()
        };

        info!(path = %path.display(), rules = rules.len(), "rule store opened");
        Ok(Self {
            path,
            cache: InMemoryRuleStore::from_rules(rules),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.persist_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("rule store persist lock poisoned".to_string()))
    }

    /// Write a snapshot via a temp file + rename.
    fn save(&self, rules: &[Rule]) -> Result<()> {
        let data = serde_json::to_string_pretty(rules)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RuleStore for JsonFileRuleStore {
    fn create_rule(&self, draft: RuleDraft) -> Result<Rule> {
        let _guard = self.lock()?;
        let rule = InMemoryRuleStore::build(draft)?;

        let mut snapshot = self.cache.list()?;
        snapshot.push(rule.clone());
        if let Err(e) = self.save(&snapshot) {
            warn!(rule_id = %rule.id, error = %e, "failed to persist new rule");
            return Err(e);
        }

        self.cache.put(rule.clone())?;
        info!(rule_id = %rule.id, name = %rule.name, enabled = rule.enabled, "rule created");
        Ok(rule)
    }

    fn update(&self, id: &RuleId, draft: RuleDraft) -> Result<Rule> {
        let _guard = self.lock()?;
        let updated = self.cache.edited(id, draft)?;

        let snapshot: Vec<Rule> = self
            .cache
            .list()?
            .into_iter()
            .map(|r| if r.id == *id { updated.clone() } else { r })
            .collect();
        if let Err(e) = self.save(&snapshot) {
            warn!(rule_id = %id, error = %e, "failed to persist rule update");
            return Err(e);
        }

        self.cache.put(updated.clone())?;
        info!(rule_id = %id, enabled = updated.enabled, "rule updated");
        Ok(updated)
    }

    fn delete(&self, id: &RuleId) -> Result<()> {
        let _guard = self.lock()?;
        let rules = self.cache.list()?;
        if !rules.iter().any(|r| r.id == *id) {
            return Err(StoreError::NotFound(id.clone()));
        }

        let snapshot: Vec<Rule> = rules.into_iter().filter(|r| r.id != *id).collect();
        if let Err(e) = self.save(&snapshot) {
            warn!(rule_id = %id, error = %e, "failed to persist rule deletion");
            return Err(e);
        }

        self.cache.remove(id)?;
        info!(rule_id = %id, "rule deleted");
        Ok(())
    }

    fn get(&self, id: &RuleId) -> Result<Option<Rule>> {
        self.cache.get(id)
    }

    fn list(&self) -> Result<Vec<Rule>> {
        self.cache.list()
    }

    fn list_active(&self) -> Result<Vec<Rule>> {
        self.cache.list_active()
    }
}
