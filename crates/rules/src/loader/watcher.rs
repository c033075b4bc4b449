//! Filesystem event handler for the notify watcher (hot-reload).

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{info, warn};

use crate::store::RuleStore;

use super::core::{is_dotfile, is_yaml, remove_file, upsert_file, FileIndex};

/// Handle a single filesystem event from the notify watcher.
pub(super) fn handle_fs_event(event: &Event, store: &dyn RuleStore, files: &FileIndex) {
    for path in &event.paths {
        // Skip dotfiles (editor swap files included) and anything not YAML
        if !is_yaml(path) || is_dotfile(path) {
            continue;
        }

        match &event.kind {
            EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_)) => {
                if !path.exists() {
                    // Rename away from this path.
                    remove_file(store, files, path);
                    continue;
                }
                match upsert_file(store, files, path) {
                    Ok(rule_id) => {
                        info!(rule_id = %rule_id, path = %path.display(), "hot-reloaded rule");
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to reload rule, keeping previous version"
                        );
                    }
                }
            }
            EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Any) => {
                remove_file(store, files, path);
            }
            _ => {}
        }
    }
}
