//! Idempotency log for dispatched actions.
//!
//! An action is identified by the SHA-256 of `(event id, action type,
//! canonical config)`. A key is claimed (in-flight) before its handler
//! starts and becomes dispatched once the handler succeeds; a failed
//! handler releases it so a later replay can try again. Evaluations that
//! find a key in flight wait for its owner instead of guessing the outcome.
//!
//! With a [`DispatchStore`] attached every change is written through, so a
//! restarted process still skips what already ran. A key still in flight
//! when the log is reopened is *in doubt*: its handler may or may not have
//! had its effect, and it is never started again within the retention window.

mod store;

pub use self::store::{
    DispatchLogError, DispatchRecord, DispatchStore, JsonFileDispatchStore, RecordStatus, Result,
};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{info, warn};

use followup_core::Action;

/// Default time a dispatched key is remembered.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Deterministic idempotency key for one action triggered by one event.
///
/// The triggering rule is not part of the key: two rules asking for the
/// identical action on the same event share a key.
pub fn idempotency_key(event_id: &str, action: &Action) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(action.kind().as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(action.canonical_config().as_bytes());
    let digest = hasher.finalize();
    format!("{digest:x}")
}

#[derive(Debug)]
enum Slot {
    /// Owned by a live [`ClaimGuard`]; the receiver closes when it is dropped.
    InFlight {
        since: DateTime<Utc>,
        done: watch::Receiver<()>,
    },
    Dispatched { at: DateTime<Utc> },
    /// Claimed by an owner that vanished without recording an outcome.
    InDoubt { since: DateTime<Utc> },
}

impl Slot {
    fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Slot::InFlight { since, .. } | Slot::InDoubt { since } => *since,
            Slot::Dispatched { at } => *at,
        }
    }

    fn record(&self) -> DispatchRecord {
        let status = match self {
            Slot::Dispatched { .. } => RecordStatus::Dispatched,
            Slot::InFlight { .. } | Slot::InDoubt { .. } => RecordStatus::InFlight,
        };
        DispatchRecord {
            status,
            at: self.timestamp(),
        }
    }
}

/// Ownership of a claimed key. Hand it back through
/// [`DispatchLog::complete`] or [`DispatchLog::release`]; dropping it
/// without either leaves the key in doubt.
#[derive(Debug)]
pub struct ClaimGuard {
    key: String,
    _done: watch::Sender<()>,
}

impl ClaimGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Handle on another evaluation's in-flight dispatch of the same key.
#[derive(Debug)]
pub struct PendingDispatch {
    done: watch::Receiver<()>,
}

impl PendingDispatch {
    /// Resolves once the owner completed or released the key.
    pub async fn wait(mut self) {
        while self.done.changed().await.is_ok() {}
    }
}

/// Result of trying to claim a key before running its handler.
#[derive(Debug)]
pub enum Claim {
    /// The caller owns the key.
    Acquired(ClaimGuard),
    /// Another evaluation is running this action right now.
    InFlight(PendingDispatch),
    /// The action already ran successfully.
    AlreadyDispatched,
    /// A previous attempt never reported back.
    InDoubt,
}

/// Shared key → state map, optionally written through to a [`DispatchStore`].
pub struct DispatchLog {
    slots: RwLock<HashMap<String, Slot>>,
    store: Option<Box<dyn DispatchStore>>,
    retention: Option<chrono::Duration>,
}

impl fmt::Debug for DispatchLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchLog")
            .field("keys", &self.read().len())
            .field("durable", &self.store.is_some())
            .field("retention", &self.retention)
            .finish()
    }
}

impl Default for DispatchLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchLog {
    /// Memory-only log with the default retention.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            store: None,
            retention: chrono::Duration::from_std(DEFAULT_RETENTION).ok(),
        }
    }

    /// Load a log from `store` and write every later change back to it.
    /// Keys that were in flight when the store was last saved come back in doubt.
    pub fn open(store: impl DispatchStore + 'static) -> Result<Self> {
        let records = store.load()?;
        let mut in_doubt = 0;
        let slots: HashMap<String, Slot> = records
            .into_iter()
            .map(|(key, record)| {
                let slot = match record.status {
                    RecordStatus::Dispatched => Slot::Dispatched { at: record.at },
                    RecordStatus::InFlight => {
                        in_doubt += 1;
                        Slot::InDoubt { since: record.at }
                    }
                };
                (key, slot)
            })
            .collect();

        info!(keys = slots.len(), in_doubt, "dispatch log opened");
        let log = Self {
            slots: RwLock::new(slots),
            store: Some(Box::new(store)),
            ..Self::new()
        };
        log.prune_expired()?;
        Ok(log)
    }

    /// Forget dispatched and in-doubt keys older than `retention`.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = chrono::Duration::from_std(retention).ok();
        self
    }

    // Every write is a single insert/remove, so the map stays consistent
    // even if a holder panicked; poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, slots: &HashMap<String, Slot>) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let records: BTreeMap<String, DispatchRecord> = slots
            .iter()
            .map(|(key, slot)| (key.clone(), slot.record()))
            .collect();
        store.save(&records)
    }

    fn prune(&self, slots: &mut HashMap<String, Slot>, now: DateTime<Utc>) -> usize {
        let Some(retention) = self.retention else {
            return 0;
        };
        let cutoff = now - retention;
        let before = slots.len();
        slots.retain(|_, slot| matches!(slot, Slot::InFlight { .. }) || slot.timestamp() > cutoff);
        before - slots.len()
    }

    /// Drop keys past the retention window. Returns how many were removed.
    pub fn prune_expired(&self) -> Result<usize> {
        let mut slots = self.write();
        let removed = self.prune(&mut slots, Utc::now());
        if removed > 0 {
            self.persist(&slots)?;
        }
        Ok(removed)
    }

    /// Atomically inspect the key and take ownership of it when free.
    ///
    /// The claim is persisted before it is returned; if that fails the key
    /// is left untouched and the error is returned.
    pub fn claim(&self, key: &str) -> Result<Claim> {
        let now = Utc::now();
        let mut slots = self.write();
        self.prune(&mut slots, now);

        match slots.get(key) {
            Some(Slot::Dispatched { .. }) => return Ok(Claim::AlreadyDispatched),
            Some(Slot::InDoubt { .. }) => return Ok(Claim::InDoubt),
            Some(Slot::InFlight { done, .. }) if done.has_changed().is_ok() => {
                return Ok(Claim::InFlight(PendingDispatch { done: done.clone() }));
            }
            Some(Slot::InFlight { since, .. }) => {
                let since = *since;
                warn!(key, "in-flight dispatch was abandoned by its owner");
                slots.insert(key.to_string(), Slot::InDoubt { since });
                self.persist(&slots)?;
                return Ok(Claim::InDoubt);
            }
            None => {}
        }

        let (tx, rx) = watch::channel(());
        slots.insert(
            key.to_string(),
            Slot::InFlight {
                since: now,
                done: rx,
            },
        );
        if let Err(e) = self.persist(&slots) {
            slots.remove(key);
            return Err(e);
        }
        Ok(Claim::Acquired(ClaimGuard {
            key: key.to_string(),
            _done: tx,
        }))
    }

    /// Record a successful dispatch. The key stays dispatched in memory even
    /// when writing it through fails.
    pub fn complete(&self, guard: ClaimGuard) -> Result<()> {
        let mut slots = self.write();
        slots.insert(guard.key.clone(), Slot::Dispatched { at: Utc::now() });
        self.persist(&slots)
    }

    /// Give a claimed key back after a failed dispatch so it can be retried.
    pub fn release(&self, guard: ClaimGuard) -> Result<()> {
        let mut slots = self.write();
        if matches!(slots.get(&guard.key), Some(Slot::InFlight { .. })) {
            slots.remove(&guard.key);
        }
        self.persist(&slots)
    }

    pub fn is_dispatched(&self, key: &str) -> bool {
        matches!(self.read().get(key), Some(Slot::Dispatched { .. }))
    }

    pub fn is_in_doubt(&self, key: &str) -> bool {
        matches!(self.read().get(key), Some(Slot::InDoubt { .. }))
    }

    /// When the key was dispatched, if it was.
    pub fn dispatched_at(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.read().get(key) {
            Some(Slot::Dispatched { at }) => Some(*at),
            _ => None,
        }
    }

    /// Number of dispatched keys (in-flight and in-doubt keys excluded).
    pub fn len(&self) -> usize {
        self.read()
            .values()
            .filter(|s| matches!(s, Slot::Dispatched { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use followup_core::{AddTagConfig, NotifyManagerConfig};
    use tempfile::TempDir;

    fn tag(t: &str) -> Action {
        Action::AddTag(AddTagConfig {
            tag: Some(t.to_string()),
        })
    }

    fn acquire(log: &DispatchLog, key: &str) -> ClaimGuard {
        match log.claim(key).unwrap() {
            Claim::Acquired(guard) => guard,
            other => panic!("expected to acquire {key}, got {other:?}"),
        }
    }

    #[test]
    fn key_is_stable_and_hex() {
        let a = idempotency_key("e1", &tag("vip"));
        let b = idempotency_key("e1", &tag("vip"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_depends_on_event_type_and_config() {
        let base = idempotency_key("e1", &tag("vip"));
        assert_ne!(base, idempotency_key("e2", &tag("vip")));
        assert_ne!(base, idempotency_key("e1", &tag("churn")));
        assert_ne!(
            idempotency_key("e1", &Action::NotifyManager(NotifyManagerConfig::default())),
            idempotency_key("e1", &Action::AddTag(AddTagConfig::default())),
        );
    }

    #[test]
    fn claim_complete_release_cycle() {
        let log = DispatchLog::new();
        let guard = acquire(&log, "k");
        assert!(matches!(log.claim("k").unwrap(), Claim::InFlight(_)));
        assert!(!log.is_dispatched("k"));

        log.release(guard).unwrap();
        let guard = acquire(&log, "k");
        log.complete(guard).unwrap();
        assert!(matches!(log.claim("k").unwrap(), Claim::AlreadyDispatched));
        assert!(log.dispatched_at("k").is_some());
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn waiter_wakes_when_owner_finishes() {
        let log = DispatchLog::new();
        let guard = acquire(&log, "k");
        let Claim::InFlight(pending) = log.claim("k").unwrap() else {
            panic!("expected in-flight claim");
        };

        let waiter = tokio::spawn(pending.wait());
        log.release(guard).unwrap();
        waiter.await.unwrap();

        // Released, so the waiter may take the key now.
        acquire(&log, "k");
    }

    #[test]
    fn dropped_guard_leaves_key_in_doubt() {
        let log = DispatchLog::new();
        drop(acquire(&log, "k"));

        assert!(matches!(log.claim("k").unwrap(), Claim::InDoubt));
        assert!(log.is_in_doubt("k"));
        assert!(!log.is_dispatched("k"));
    }

    #[test]
    fn durable_log_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dispatch.json");

        let log = DispatchLog::open(JsonFileDispatchStore::new(&path).unwrap()).unwrap();
        let done = acquire(&log, "done");
        log.complete(done).unwrap();
        let _crashed = acquire(&log, "crashed");
        let failed = acquire(&log, "failed");
        log.release(failed).unwrap();
        drop(log);

        let reopened = DispatchLog::open(JsonFileDispatchStore::new(&path).unwrap()).unwrap();
        assert!(matches!(reopened.claim("done").unwrap(), Claim::AlreadyDispatched));
        assert!(matches!(reopened.claim("crashed").unwrap(), Claim::InDoubt));
        assert!(matches!(reopened.claim("failed").unwrap(), Claim::Acquired(_)));
    }

    #[test]
    fn expired_keys_are_pruned() {
        let log = DispatchLog::new().with_retention(Duration::ZERO);
        let guard = acquire(&log, "k");
        // In-flight keys are never pruned.
        assert_eq!(log.prune_expired().unwrap(), 0);
        log.complete(guard).unwrap();

        assert_eq!(log.prune_expired().unwrap(), 1);
        assert!(log.is_empty());
        acquire(&log, "k");
    }

    #[test]
    fn default_retention_keeps_recent_keys() {
        let log = DispatchLog::new();
        let guard = acquire(&log, "k");
        log.complete(guard).unwrap();
        assert_eq!(log.prune_expired().unwrap(), 0);
        assert!(log.is_dispatched("k"));
    }
}
