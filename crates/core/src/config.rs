use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub engine: EngineConfig,
    pub rules: RulesConfig,
    pub audit: AuditConfig,
    pub webhook: WebhookConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `FOLLOWUP_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("FOLLOWUP_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            engine: EngineConfig::from_env_profiled(p),
            rules: RulesConfig::from_env_profiled(p),
            audit: AuditConfig::from_env_profiled(p),
            webhook: WebhookConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  engine:   deadline_ms={}, max_concurrency={}",
            self.engine
                .dispatch_deadline_ms
                .map(|ms| ms.to_string())
                .as_deref()
                .unwrap_or("(none)"),
            self.engine.max_concurrency
        );
        tracing::info!(
            "  dispatch: log={}, retention_secs={}",
            self.engine
                .dispatch_log_path
                .as_ref()
                .map(|p| p.display().to_string())
                .as_deref()
                .unwrap_or("(memory)"),
            self.engine.dispatch_retention_secs
        );
        tracing::info!(
            "  rules:    dir={}, store={}",
            self.rules.rules_dir.display(),
            self.rules
                .store_path
                .as_ref()
                .map(|p| p.display().to_string())
                .as_deref()
                .unwrap_or("(memory)")
        );
        tracing::info!("  audit:    max_entries_per_rule={}", self.audit.max_entries_per_rule);
        tracing::info!("  webhook:  configured={}", self.webhook.is_configured());
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-event dispatch deadline; `None` means no deadline.
    pub dispatch_deadline_ms: Option<u64>,
    /// Events evaluated concurrently by stream evaluation.
    pub max_concurrency: usize,
    /// JSON file backing the idempotency log; in-memory when unset.
    pub dispatch_log_path: Option<PathBuf>,
    /// How long a dispatched key is remembered before it may be pruned.
    pub dispatch_retention_secs: u64,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dispatch_deadline_ms: profiled_env_opt(p, "FOLLOWUP_DISPATCH_DEADLINE_MS")
                .and_then(|v| v.parse().ok()),
            max_concurrency: profiled_env_usize(p, "FOLLOWUP_MAX_CONCURRENCY", 8).max(1),
            dispatch_log_path: profiled_env_opt(p, "FOLLOWUP_DISPATCH_LOG_PATH").map(PathBuf::from),
            dispatch_retention_secs: profiled_env_u64(
                p,
                "FOLLOWUP_DISPATCH_RETENTION_SECS",
                DEFAULT_DISPATCH_RETENTION_SECS,
            ),
        }
    }

    pub fn dispatch_deadline(&self) -> Option<Duration> {
        self.dispatch_deadline_ms.map(Duration::from_millis)
    }

    pub fn dispatch_retention(&self) -> Duration {
        Duration::from_secs(self.dispatch_retention_secs)
    }
}

/// Seven days.
const DEFAULT_DISPATCH_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_deadline_ms: None,
            max_concurrency: 8,
            dispatch_log_path: None,
            dispatch_retention_secs: DEFAULT_DISPATCH_RETENTION_SECS,
        }
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Directory of YAML rule files loaded at startup.
    pub rules_dir: PathBuf,
    /// JSON file backing the rule store; in-memory when unset.
    pub store_path: Option<PathBuf>,
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            rules_dir: PathBuf::from(profiled_env_or(p, "FOLLOWUP_RULES_DIR", "data/rules")),
            store_path: profiled_env_opt(p, "FOLLOWUP_RULE_STORE_PATH").map(PathBuf::from),
        }
    }
}

// ── Audit ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub max_entries_per_rule: usize,
}

impl AuditConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_entries_per_rule: profiled_env_usize(p, "FOLLOWUP_AUDIT_MAX_ENTRIES", 500),
        }
    }
}

// ── Webhook action handler ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl WebhookConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "FOLLOWUP_WEBHOOK_URL"),
            timeout_secs: profiled_env_u64(p, "FOLLOWUP_WEBHOOK_TIMEOUT_SECS", 30),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_prefixed_keys_win() {
        env::set_var("CFGTEST_FOLLOWUP_MAX_CONCURRENCY", "3");
        env::set_var("CFGTEST_FOLLOWUP_DISPATCH_DEADLINE_MS", "250");
        env::set_var("CFGTEST_FOLLOWUP_RULE_STORE_PATH", "/tmp/rules.json");
        env::set_var("CFGTEST_FOLLOWUP_DISPATCH_LOG_PATH", "/tmp/dispatch.json");
        env::set_var("CFGTEST_FOLLOWUP_DISPATCH_RETENTION_SECS", "3600");

        let config = Config::for_profile("cfgtest");
        assert_eq!(config.profile_label(), "CFGTEST");
        assert_eq!(config.engine.max_concurrency, 3);
        assert_eq!(config.engine.dispatch_deadline(), Some(Duration::from_millis(250)));
        assert_eq!(config.rules.store_path, Some(PathBuf::from("/tmp/rules.json")));
        assert_eq!(
            config.engine.dispatch_log_path,
            Some(PathBuf::from("/tmp/dispatch.json"))
        );
        assert_eq!(config.engine.dispatch_retention(), Duration::from_secs(3600));
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        env::set_var("BADCFG_FOLLOWUP_MAX_CONCURRENCY", "lots");
        env::set_var("BADCFG_FOLLOWUP_AUDIT_MAX_ENTRIES", "-1");

        let config = Config::for_profile("badcfg");
        assert_eq!(config.engine.max_concurrency, 8);
        assert_eq!(config.audit.max_entries_per_rule, 500);
        assert_eq!(
            config.engine.dispatch_retention_secs,
            EngineConfig::default().dispatch_retention_secs
        );
    }
}
