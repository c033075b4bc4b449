//! Rule engine orchestration.
//!
//! This crate provides:
//! - `RuleEngine`: load → match → resolve → dispatch → report, per event
//! - `EvaluationResult`, the immutable audit record of one evaluation
//! - `AuditSink` trait and an in-memory per-rule `AuditLog`
//! - The `rules-worker` binary

pub mod audit_log;
pub mod engine;
pub mod result;

pub use audit_log::{AuditLog, AuditSink, RuleAuditSummary};
pub use engine::RuleEngine;
pub use result::{ActionRecord, EvaluationError, EvaluationResult, MatchedRule, Preview};
