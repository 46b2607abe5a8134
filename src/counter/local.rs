//! File-backed fallback counter.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::CounterError;

/// What the local document says about the sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub count: u64,
    /// `count` was reached while the remote store was unreachable and the
    /// store has not caught up with it yet.
    pub unsynced: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocalDocument {
    count: u64,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    unsynced: bool,
}

/// Counter value persisted as a small JSON document on local disk.
///
/// Reads followed by writes are not atomic across processes.
#[derive(Debug, Clone)]
pub struct LocalCounter {
    path: PathBuf,
}

impl LocalCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current count; a missing or unreadable document counts as 0.
    pub async fn read(&self) -> Result<u64, CounterError> {
        Ok(self.snapshot().await?.count)
    }

    pub async fn snapshot(&self) -> Result<LocalSnapshot, CounterError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LocalSnapshot::default()),
            Err(e) => return Err(CounterError::Local(e)),
        };

        Ok(parse_snapshot(&raw).unwrap_or_else(|| {
            log::warn!(
                "Local counter at {} is corrupted, treating it as 0",
                self.path.display()
            );
            LocalSnapshot::default()
        }))
    }

    /// Mirror a value the remote store already holds.
    pub async fn write(&self, count: u64) -> Result<(), CounterError> {
        self.store(count, false).await
    }

    /// Record a number handed out without the remote store.
    pub async fn write_unsynced(&self, count: u64) -> Result<(), CounterError> {
        self.store(count, true).await
    }

    async fn store(&self, count: u64, unsynced: bool) -> Result<(), CounterError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(CounterError::Local)?;
        }

        let document = LocalDocument {
            count,
            updated_at: Utc::now(),
            unsynced,
        };
        let body = serde_json::to_vec(&document).map_err(|e| CounterError::Local(e.into()))?;
        fs::write(&self.path, body)
            .await
            .map_err(CounterError::Local)
    }
}

/// Accepts the JSON document as well as a bare integer left by older builds.
fn parse_snapshot(raw: &str) -> Option<LocalSnapshot> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(LocalSnapshot::default());
    }
    if let Ok(document) = serde_json::from_str::<LocalDocument>(trimmed) {
        return Some(LocalSnapshot {
            count: document.count,
            unsynced: document.unsynced,
        });
    }
    trimmed.parse::<u64>().ok().map(|count| LocalSnapshot {
        count,
        unsynced: false,
    })
}
