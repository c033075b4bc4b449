//! rules-worker: batch front end for the rule engine.
//!
//! Subcommands:
//! - `run`: load YAML rules, read JSON-lines events, print one
//!   `EvaluationResult` JSON per line (optionally a per-rule audit summary
//!   on stderr)
//! - `check`: validate YAML rule files without running anything
//! - `ingest`: store AI-suggested drafts (disabled) in the JSON rule store
//! - `approve`: enable a stored draft

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use followup_actions::{
    ActionDispatcher, ActionHandler, DispatchLog, HandlerRegistry, JsonFileDispatchStore, LogHandler,
    WebhookHandler,
};
use followup_core::{Config, InteractionEvent, RuleDraft, RuleId};
use followup_engine::{AuditLog, RuleEngine};
use followup_rules::loader::{LoadStatus, RuleLoader};
use followup_rules::{validate_rule, InMemoryRuleStore, JsonFileRuleStore, RuleStore, SuggestionIngestor};

// ── CLI ─────────────────────────────────────────────────────────────

/// Post-interaction automation rule worker.
#[derive(Parser, Debug)]
#[command(name = "rules-worker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate JSON-lines events against the rules directory.
    Run {
        /// Directory of YAML rule files.
        #[arg(long, env = "FOLLOWUP_RULES_DIR")]
        rules_dir: Option<PathBuf>,

        /// JSON-lines event file, or `-` for stdin.
        #[arg(long, default_value = "-")]
        events: String,

        /// Also evaluate the rules held in this JSON rule store.
        #[arg(long, env = "FOLLOWUP_RULE_STORE_PATH")]
        store: Option<PathBuf>,

        /// POST every action to this URL instead of only logging it.
        #[arg(long, env = "FOLLOWUP_WEBHOOK_URL")]
        webhook_url: Option<String>,

        /// Per-event dispatch deadline in milliseconds.
        #[arg(long, env = "FOLLOWUP_DISPATCH_DEADLINE_MS")]
        deadline_ms: Option<u64>,

        /// Events evaluated concurrently.
        #[arg(long, env = "FOLLOWUP_MAX_CONCURRENCY")]
        concurrency: Option<usize>,

        /// Idempotency log file; replays after a restart skip what already ran.
        #[arg(long, env = "FOLLOWUP_DISPATCH_LOG_PATH")]
        dispatch_log: Option<PathBuf>,

        /// Print a per-rule audit summary to stderr after the run.
        #[arg(long)]
        audit: bool,
    },

    /// Validate YAML rule files and report errors and warnings.
    Check {
        #[arg(long, env = "FOLLOWUP_RULES_DIR")]
        rules_dir: Option<PathBuf>,
    },

    /// Store a JSON array of suggested rule drafts, disabled.
    Ingest {
        /// JSON file containing an array of rule drafts.
        #[arg(long)]
        drafts: PathBuf,

        #[arg(long, env = "FOLLOWUP_RULE_STORE_PATH", default_value = "data/rules.json")]
        store: PathBuf,
    },

    /// Enable a stored rule (human approval of a draft).
    Approve {
        id: String,

        #[arg(long, env = "FOLLOWUP_RULE_STORE_PATH", default_value = "data/rules.json")]
        store: PathBuf,
    },
}

// ── Subcommands ─────────────────────────────────────────────────────

struct RunArgs {
    rules_dir: PathBuf,
    events: String,
    store_path: Option<PathBuf>,
    webhook_url: Option<String>,
    deadline_ms: Option<u64>,
    concurrency: usize,
    dispatch_log: Option<PathBuf>,
    audit: bool,
}

async fn run(config: &Config, args: RunArgs) -> anyhow::Result<()> {
    let RunArgs {
        rules_dir,
        events: events_path,
        store_path,
        webhook_url,
        deadline_ms,
        concurrency,
        dispatch_log,
        audit: print_audit,
    } = args;

    let store = Arc::new(match &store_path {
        Some(path) => {
            let persisted = JsonFileRuleStore::open(path)
                .with_context(|| format!("opening rule store {}", path.display()))?;
            InMemoryRuleStore::from_rules(persisted.list()?)
        }
        None => InMemoryRuleStore::new(),
    });

    let loader = RuleLoader::new(rules_dir, store.clone());
    let results = loader.load_all().context("loading rules directory")?;
    let failed = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Failed { .. }))
        .count();
    info!(
        rules_dir = %loader.rules_dir().display(),
        files = results.len(),
        failed,
        active = store.list_active()?.len(),
        "rules loaded"
    );

    let handler: Arc<dyn ActionHandler> = match webhook_url {
        Some(url) => Arc::new(
            WebhookHandler::new(&url, Duration::from_secs(config.webhook.timeout_secs))
                .context("configuring webhook handler")?,
        ),
        None => Arc::new(LogHandler::new()),
    };
    let log = match &dispatch_log {
        Some(path) => {
            let file = JsonFileDispatchStore::new(path)
                .with_context(|| format!("opening dispatch log {}", path.display()))?;
            DispatchLog::open(file)
                .with_context(|| format!("loading dispatch log {}", path.display()))?
        }
        None => DispatchLog::new(),
    }
    .with_retention(config.engine.dispatch_retention());
    let pruned = log.prune_expired().context("pruning dispatch log")?;
    if pruned > 0 {
        info!(pruned, "expired dispatch keys removed");
    }
    let dispatcher =
        ActionDispatcher::with_log(HandlerRegistry::with_fallback(handler), Arc::new(log));
    let audit = Arc::new(AuditLog::with_max_entries(config.audit.max_entries_per_rule));

    let engine = RuleEngine::new(store.clone(), dispatcher)
        .with_default_deadline(deadline_ms.map(Duration::from_millis))
        .with_sink(audit.clone());

    let events = read_events(&events_path)?;
    info!(events = events.len(), concurrency, "evaluating events");

    let results = engine.evaluate_all(events, concurrency).await;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for result in results {
        serde_json::to_writer(&mut out, &result)?;
        writeln!(out)?;
    }
    out.flush()?;

    if print_audit {
        let live: Vec<RuleId> = store.list()?.into_iter().map(|r| r.id).collect();
        audit.retain_rules(|id| live.contains(id));
        let stderr = io::stderr();
        let mut err = stderr.lock();
        for rule_id in audit.rule_ids() {
            serde_json::to_writer(&mut err, &audit.summary(&rule_id))?;
            writeln!(err)?;
        }
    }
    Ok(())
}

fn read_events(path: &str) -> anyhow::Result<Vec<InteractionEvent>> {
    let reader: Box<dyn BufRead> = if path == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = std::fs::File::open(path).with_context(|| format!("opening events file {path}"))?;
        Box::new(BufReader::new(file))
    };

    let mut events = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InteractionEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => warn!(line = n + 1, error = %e, "skipping malformed event"),
        }
    }
    Ok(events)
}

fn check(rules_dir: &Path) -> anyhow::Result<()> {
    let loader = RuleLoader::new(rules_dir.to_path_buf(), Arc::new(InMemoryRuleStore::new()));
    let mut errors = 0;

    for result in loader.load_all()? {
        let path = result.path.display();
        match result.status {
            LoadStatus::Skipped { .. } => {}
            LoadStatus::Failed { error } => {
                errors += 1;
                println!("{path}: error: {error}");
            }
            LoadStatus::Loaded { .. } => {
                let draft = loader.load_file(&result.path)?;
                let report = validate_rule(&draft);
                for w in &report.warnings {
                    match &w.suggestion {
                        Some(s) => println!("{path}: warning: {}: {} ({s})", w.path, w.message),
                        None => println!("{path}: warning: {}: {}", w.path, w.message),
                    }
                }
            }
        }
    }

    if errors > 0 {
        bail!("{errors} rule file(s) failed validation");
    }
    Ok(())
}

fn ingest(drafts_path: &Path, store_path: &Path) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(drafts_path)
        .with_context(|| format!("reading drafts {}", drafts_path.display()))?;
    let drafts: Vec<RuleDraft> = serde_json::from_str(&data).context("parsing drafts")?;

    let store = Arc::new(
        JsonFileRuleStore::open(store_path)
            .with_context(|| format!("opening rule store {}", store_path.display()))?,
    );
    let report = SuggestionIngestor::new(store).ingest_with_report(drafts);
    for rejected in &report.rejected {
        warn!(index = rejected.index, name = %rejected.name, error = %rejected.error, "draft rejected");
    }
    info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        "drafts ingested"
    );

    println!("{}", serde_json::to_string_pretty(&report.accepted)?);
    Ok(())
}

fn approve(id: &str, store_path: &Path) -> anyhow::Result<()> {
    let store = JsonFileRuleStore::open(store_path)
        .with_context(|| format!("opening rule store {}", store_path.display()))?;
    let rule = store
        .set_enabled(&RuleId::from(id), true)
        .with_context(|| format!("enabling rule {id}"))?;
    info!(rule_id = %rule.id, name = %rule.name, "rule approved");
    println!("{}", serde_json::to_string_pretty(&rule)?);
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    followup_core::load_dotenv();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();

    match cli.command {
        Command::Run {
            rules_dir,
            events,
            store,
            webhook_url,
            deadline_ms,
            concurrency,
            dispatch_log,
            audit,
        } => {
            let args = RunArgs {
                rules_dir: rules_dir.unwrap_or_else(|| config.rules.rules_dir.clone()),
                events,
                store_path: store.or_else(|| config.rules.store_path.clone()),
                webhook_url: webhook_url.or_else(|| config.webhook.url.clone()),
                deadline_ms: deadline_ms.or(config.engine.dispatch_deadline_ms),
                concurrency: concurrency.unwrap_or(config.engine.max_concurrency),
                dispatch_log: dispatch_log.or_else(|| config.engine.dispatch_log_path.clone()),
                audit,
            };
            run(&config, args).await
        }
        Command::Check { rules_dir } => {
            check(&rules_dir.unwrap_or_else(|| config.rules.rules_dir.clone()))
        }
        Command::Ingest { drafts, store } => ingest(&drafts, &store),
        Command::Approve { id, store } => approve(&id, &store),
    }
}
