//! Per-ticket completion marker on disk.
//!
//! After an execution the engine writes `<dir>/<ticket_uuid>.json` so
//! external tooling can observe the outcome without reading the store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelRecord {
    pub ticket_uuid: String,
    pub status: String,
    /// Whether the outcome reached the primary store.
    pub committed: bool,
    pub error: Option<String>,
    pub finished_at: u64,
}

#[derive(Debug, Clone)]
pub struct SentinelWriter {
    dir: PathBuf,
}

impl SentinelWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticket_uuid: &str) -> PathBuf {
        self.dir.join(format!("{ticket_uuid}.json"))
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn write(&self, record: &SentinelRecord) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&record.ticket_uuid);
        let tmp = self.dir.join(format!(".{}.json.tmp", record.ticket_uuid));
        let body = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "sentinel written");
        Ok(path)
    }

    pub fn read(path: &Path) -> std::io::Result<SentinelRecord> {
        let body = std::fs::read(path)?;
        serde_json::from_slice(&body).map_err(std::io::Error::other)
    }
}
