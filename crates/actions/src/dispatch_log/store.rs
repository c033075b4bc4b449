//! Durable backing for the dispatch log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Persisted state of one idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// A handler was started; its outcome was not recorded yet.
    InFlight,
    Dispatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub status: RecordStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for dispatch log persistence.
pub type Result<T> = std::result::Result<T, DispatchLogError>;

/// Where the dispatch log keeps its records between process runs.
///
/// `save` receives the complete snapshot after every change; implementations
/// must replace the previous snapshot atomically.
pub trait DispatchStore: Send + Sync {
    fn load(&self) -> Result<BTreeMap<String, DispatchRecord>>;

    fn save(&self, records: &BTreeMap<String, DispatchRecord>) -> Result<()>;
}

/// Single JSON file holding every record, rewritten via temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonFileDispatchStore {
    path: PathBuf,
}

impl JsonFileDispatchStore {
    /// Use `path` as the log file, creating its parent directory if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "dispatch log store initialized");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DispatchStore for JsonFileDispatchStore {
    fn load(&self) -> Result<BTreeMap<String, DispatchRecord>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, records: &BTreeMap<String, DispatchRecord>) -> Result<()> {
        let data = serde_json::to_string(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
