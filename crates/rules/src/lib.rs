//! Rule definitions at rest and at match time.
//!
//! This crate provides:
//! - Condition evaluation against interaction events (AND semantics, fail closed)
//! - Rule validation with structured errors, warnings and suggestions
//! - Conflict resolution into a deterministic, priority-ordered action plan
//! - The [`RuleStore`](store::RuleStore) seam with in-memory and JSON-file stores
//! - A YAML rule-directory loader with hot-reload via `notify` watcher
//! - The suggestion ingestor that keeps AI-proposed rules disabled

pub mod evaluator;
pub mod ingest;
pub mod loader;
pub mod resolver;
pub mod store;
pub mod validation;

pub use evaluator::{matches, rule_matches};
pub use ingest::SuggestionIngestor;
pub use resolver::{resolve, PlannedAction, Resolution};
pub use store::{InMemoryRuleStore, JsonFileRuleStore, RuleStore, StoreError};
pub use validation::{validate_rule, ValidationResult};
