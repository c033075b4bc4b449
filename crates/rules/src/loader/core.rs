//! Core [`RuleLoader`] struct: directory scan into a rule store, optional hot-reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use followup_core::{RuleDraft, RuleId};

use crate::store::{RuleStore, StoreError};

use super::error::{LoadResult, LoadStatus, Result};
use super::watcher::handle_fs_event;

/// Path → id of the rule that file produced.
pub(super) type FileIndex = Arc<RwLock<HashMap<PathBuf, RuleId>>>;

/// Loads YAML rule files from a directory into a [`RuleStore`].
pub struct RuleLoader {
    /// Root directory containing rule YAML files.
    rules_dir: PathBuf,
    store: Arc<dyn RuleStore>,
    files: FileIndex,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: PathBuf, store: Arc<dyn RuleStore>) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            store,
            files: Arc::new(RwLock::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// Recursively scan the rules directory and load all YAML files.
    ///
    /// Dotfiles and non-YAML files are skipped. Parse and validation errors
    /// are reported per-file but do not abort the scan. Files are visited in
    /// path order so repeated loads create rules in the same order.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut results)?;
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths {
            if is_dotfile(&path) {
                if path.is_file() {
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Skipped {
                            reason: "dotfile".to_string(),
                        },
                    });
                }
                continue;
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            let status = match upsert_file(self.store.as_ref(), &self.files, &path) {
                Ok(rule_id) => {
                    info!(rule_id = %rule_id, path = %path.display(), "loaded rule");
                    LoadStatus::Loaded { rule_id }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    LoadStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            results.push(LoadResult { path, status });
        }

        Ok(())
    }

    /// Parse a single YAML file into a [`RuleDraft`] without touching the store.
    pub fn load_file(&self, path: &Path) -> Result<RuleDraft> {
        parse_file(path)
    }

    /// Start a filesystem watcher.
    ///
    /// On file create/modify the rule is re-parsed and upserted.
    /// On file delete the rule is removed from the store.
    /// Parse errors are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let files = Arc::clone(&self.files);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, store.as_ref(), &files),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;
        let _ = watcher
            .configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.rules_dir.display(), "watching rules directory for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Id of the rule loaded from `path`, if any.
    pub fn rule_for(&self, path: &Path) -> Option<RuleId> {
        self.files.read().ok()?.get(path).cloned()
    }
}

pub(super) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

pub(super) fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn parse_file(path: &Path) -> Result<RuleDraft> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Parse `path` and create or update its rule. Returns the rule id.
pub(super) fn upsert_file(store: &dyn RuleStore, files: &FileIndex, path: &Path) -> Result<RuleId> {
    let draft = parse_file(path)?;

    let known = files.read().ok().and_then(|f| f.get(path).cloned());
    if let Some(id) = known {
        match store.update(&id, draft.clone()) {
            Ok(_) => return Ok(id),
            // Deleted behind our back: fall through and recreate.
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let id = store.create(draft)?;
    if let Ok(mut guard) = files.write() {
        guard.insert(path.to_path_buf(), id.clone());
    }
    Ok(id)
}

/// Delete the rule loaded from `path`. Returns its id when one was known.
pub(super) fn remove_file(store: &dyn RuleStore, files: &FileIndex, path: &Path) -> Option<RuleId> {
    let id = files.write().ok()?.remove(path)?;
    match store.delete(&id) {
        Ok(()) | Err(StoreError::NotFound(_)) => {
            info!(rule_id = %id, path = %path.display(), "removed rule after file deletion");
        }
        Err(e) => warn!(rule_id = %id, error = %e, "failed to remove rule after file deletion"),
    }
    Some(id)
}
