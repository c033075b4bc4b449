//! Filesystem rule loader with hot-reload via `notify` watcher.
//!
//! Each `*.yml` / `*.yaml` file under the rules directory holds one
//! [`RuleDraft`](followup_core::RuleDraft). Files are pushed into a
//! [`RuleStore`](crate::store::RuleStore), so the same write-time validation
//! applies as for the builder UI. The loader remembers which rule id each
//! file produced and turns later edits and deletions into store updates.

mod core;
mod error;
mod watcher;


pub use self::core::RuleLoader;
pub use self::error::{LoadError, LoadResult, LoadStatus, Result};
