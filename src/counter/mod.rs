//! Invoice counter - the monotonic invoice-number sequence.
//!
//! The authoritative value lives in a remote transactional store behind
//! [`CounterStore`]. When that store cannot be reached the service falls back
//! to a local file ([`LocalCounter`]) and reports [`CounterMode::Degraded`].
//! The local path is last-writer-wins: two processes committing while
//! degraded can hand out the same number.

pub mod handlers;
pub mod local;
pub mod memory;
pub mod postgres;
pub mod service;

pub use local::{LocalCounter, LocalSnapshot};
pub use memory::InMemoryCounterStore;
pub use postgres::PgCounterStore;
pub use service::CounterService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub const DEFAULT_COUNTER_KEY: &str = "invoice_counter";

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("counter update conflicted {0} times in a row")]
    Contended(u32),
    #[error("local counter failed: {0}")]
    Local(#[source] std::io::Error),
}

/// Last issued sequence number plus the time it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub count: u64,
    pub updated_at: DateTime<Utc>,
}

impl CounterRecord {
    pub fn new(count: u64) -> Self {
        Self {
            count,
            updated_at: Utc::now(),
        }
    }
}

/// Transactional backing store for the counter document.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the record stored under `key`, `None` when it was never written.
    async fn read(&self, key: &str) -> Result<Option<CounterRecord>, CounterError>;

    /// Write `next` only if the stored count still equals `expected`
    /// (`None` meaning "no record yet"). Returns `false` on a lost race.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        next: CounterRecord,
    ) -> Result<bool, CounterError>;

    /// Unconditionally set the count under `key` to 0.
    async fn reset(&self, key: &str) -> Result<(), CounterError>;
}

/// Whether a reading came from the remote store or the local fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    Synced,
    Degraded,
}

impl CounterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterMode::Synced => "synced",
            CounterMode::Degraded => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, CounterMode::Degraded)
    }
}

/// Lifecycle of the service as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CounterState {
    Uninitialized,
    Synced,
    Degraded,
}

impl From<CounterMode> for CounterState {
    fn from(mode: CounterMode) -> Self {
        match mode {
            CounterMode::Synced => CounterState::Synced,
            CounterMode::Degraded => CounterState::Degraded,
        }
    }
}

/// Result of [`CounterService::peek_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    pub next: u64,
    pub mode: CounterMode,
}

/// Result of [`CounterService::commit_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The number consumed by this commit.
    pub issued: u64,
    /// The number to show as "next" afterwards.
    pub next: u64,
    pub mode: CounterMode,
}
