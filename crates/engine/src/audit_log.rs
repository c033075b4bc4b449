//! Audit trail for rule evaluations.
//!
//! [`AuditSink`] receives every finished [`EvaluationResult`]. [`AuditLog`]
//! is the in-memory sink: per-rule entries capped at a configurable maximum
//! (default 500) with FIFO eviction. Uses `std::sync::RwLock` so it can be
//! read from both async handlers and plain threads.

use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use followup_actions::DispatchOutcome;
use followup_core::RuleId;

use crate::result::{EvaluationError, EvaluationResult};

/// Consumer of finished evaluations (logging, metrics, persistence).
pub trait AuditSink: Send + Sync {
    fn record(&self, result: &EvaluationResult);
}

/// Severity level for audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Numeric severity for comparison (higher = more severe).
    pub fn as_severity(&self) -> u8 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warning => 2,
            LogLevel::Error => 3,
        }
    }
}

/// Evaluation step that produced the entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Match,
    Dispatch,
    Duplicate,
    DispatchError,
    RuleError,
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub rule_id: RuleId,
    pub event_id: String,
    pub level: LogLevel,
    pub phase: ExecutionPhase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Query parameters for filtering audit log entries.
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// Minimum log level (inclusive).
    pub level: Option<LogLevel>,
    pub phase: Option<ExecutionPhase>,
    /// Maximum number of entries to return (default 100).
    pub limit: Option<u32>,
    /// Only return entries at or after this ISO 8601 timestamp.
    pub since: Option<String>,
}

/// Per-phase entry counts for one rule, over the entries still retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleAuditSummary {
    pub rule_id: RuleId,
    pub matches: usize,
    pub dispatched: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub rule_errors: usize,
    pub last_seen: Option<DateTime<Utc>>,
}

/// In-memory per-rule audit log with FIFO eviction.
pub struct AuditLog {
    entries: RwLock<HashMap<RuleId, VecDeque<LogEntry>>>,
    max_entries_per_rule: usize,
}

impl AuditLog {
    /// Create a new audit log with the default cap of 500 entries per rule.
    pub fn new() -> Self {
        Self::with_max_entries(500)
    }

    /// Create a new audit log with a custom per-rule entry cap.
    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries_per_rule: max.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<RuleId, VecDeque<LogEntry>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<RuleId, VecDeque<LogEntry>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, entry: LogEntry) {
        let mut guard = self.write();
        let deque = guard.entry(entry.rule_id.clone()).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_rule {
            deque.pop_front();
        }
    }

    fn entry(
        event_id: &str,
        rule_id: &RuleId,
        level: LogLevel,
        phase: ExecutionPhase,
        message: String,
        details: Option<serde_json::Value>,
    ) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            rule_id: rule_id.clone(),
            event_id: event_id.to_string(),
            level,
            phase,
            message,
            details,
        }
    }

    /// Query log entries for a rule, newest first.
    pub fn query(&self, rule_id: &RuleId, params: &LogQueryParams) -> Vec<LogEntry> {
        let guard = self.read();
        let Some(deque) = guard.get(rule_id) else {
            return Vec::new();
        };

        let min_severity = params.level.as_ref().map(|l| l.as_severity()).unwrap_or(0);
        let since: Option<DateTime<Utc>> = params
            .since
            .as_ref()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());
        let limit = params.limit.unwrap_or(100) as usize;

        deque
            .iter()
            .rev()
            .filter(|e| e.level.as_severity() >= min_severity)
            .filter(|e| params.phase.as_ref().map_or(true, |p| &e.phase == p))
            .filter(|e| since.map_or(true, |s| e.timestamp >= s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Clear all log entries for a specific rule.
    pub fn clear(&self, rule_id: &RuleId) {
        self.write().remove(rule_id);
    }

    /// Drop the entries of every rule `keep` rejects (e.g. deleted rules).
    /// Returns how many rules were dropped.
    pub fn retain_rules(&self, keep: impl Fn(&RuleId) -> bool) -> usize {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|rule_id, _| keep(rule_id));
        before - guard.len()
    }

    /// Rules with at least one entry, sorted by id.
    pub fn rule_ids(&self) -> Vec<RuleId> {
        let mut ids: Vec<RuleId> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn summary(&self, rule_id: &RuleId) -> RuleAuditSummary {
        let mut summary = RuleAuditSummary {
            rule_id: rule_id.clone(),
            matches: 0,
            dispatched: 0,
            duplicates: 0,
            failed: 0,
            rule_errors: 0,
            last_seen: None,
        };
        let guard = self.read();
        let Some(deque) = guard.get(rule_id) else {
            return summary;
        };
        for entry in deque {
            match entry.phase {
                ExecutionPhase::Match => summary.matches += 1,
                ExecutionPhase::Dispatch => summary.dispatched += 1,
                ExecutionPhase::Duplicate => summary.duplicates += 1,
                ExecutionPhase::DispatchError => summary.failed += 1,
                ExecutionPhase::RuleError => summary.rule_errors += 1,
            }
        }
        summary.last_seen = deque.back().map(|e| e.timestamp);
        summary
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, result: &EvaluationResult) {
        let event_id = result.event_id.as_str();

        for matched in &result.matched_rules {
            self.push(Self::entry(
                event_id,
                &matched.rule_id,
                LogLevel::Info,
                ExecutionPhase::Match,
                format!("rule '{}' matched event {event_id}", matched.name),
                Some(serde_json::json!({ "priority": matched.priority })),
            ));
        }

        for record in &result.dispatched_actions {
            let details = serde_json::json!({
                "action_type": record.action_type(),
                "action_index": record.action_index,
                "idempotency_key": record.idempotency_key,
                "outcome": record.outcome,
            });
            let (level, phase, message) = match &record.outcome {
                DispatchOutcome::Dispatched => (
                    LogLevel::Info,
                    ExecutionPhase::Dispatch,
                    format!("{} dispatched", record.action_type()),
                ),
                DispatchOutcome::SkippedDuplicate => (
                    LogLevel::Debug,
                    ExecutionPhase::Duplicate,
                    format!("{} skipped as duplicate", record.action_type()),
                ),
                DispatchOutcome::Failed { reason } => (
                    LogLevel::Warning,
                    ExecutionPhase::DispatchError,
                    format!("{} failed: {reason}", record.action_type()),
                ),
            };
            self.push(Self::entry(
                event_id,
                &record.rule_id,
                level,
                phase,
                message,
                Some(details),
            ));
        }

        for error in &result.errors {
            if let EvaluationError::RulePanicked { rule_id } = error {
                self.push(Self::entry(
                    event_id,
                    rule_id,
                    LogLevel::Error,
                    ExecutionPhase::RuleError,
                    "condition evaluation panicked; rule skipped".to_string(),
                    None,
                ));
            }
        }
    }
}
