//! Layered counter service: remote store first, local file second.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    CommitOutcome, CounterError, CounterMode, CounterReading, CounterRecord, CounterState,
    CounterStore, LocalCounter,
};

/// Attempts at the compare-and-set loop before a commit fails as contended.
const MAX_COMMIT_ATTEMPTS: u32 = 5;

pub struct CounterService {
    store: Arc<dyn CounterStore>,
    local: LocalCounter,
    key: String,
    state: RwLock<CounterState>,
}

impl CounterService {
    pub fn new(store: Arc<dyn CounterStore>, local: LocalCounter, key: impl Into<String>) -> Self {
        Self {
            store,
            local,
            key: key.into(),
            state: RwLock::new(CounterState::Uninitialized),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> CounterState {
        *self.state.read()
    }

    fn mark(&self, mode: CounterMode) {
        let next = CounterState::from(mode);
        let mut state = self.state.write();
        if *state != next {
            log::info!("Invoice counter '{}' is now {:?}", self.key, next);
            *state = next;
        }
    }

    /// Highest number this process handed out while the remote store was
    /// unreachable, if the store has not caught up with it yet. An unreadable
    /// local file counts as nothing pending.
    async fn unsynced_floor(&self) -> u64 {
        match self.local.snapshot().await {
            Ok(snapshot) if snapshot.unsynced => snapshot.count,
            Ok(_) => 0,
            Err(e) => {
                log::warn!("Ignoring unreadable local counter: {}", e);
                0
            }
        }
    }

    /// The number a new draft should carry. Does not mutate anything.
    pub async fn peek_next(&self) -> Result<CounterReading, CounterError> {
        match self.store.read(&self.key).await {
            Ok(record) => {
                let remote = record.map(|r| r.count).unwrap_or(0);
                let current = remote.max(self.unsynced_floor().await);
                self.mark(CounterMode::Synced);
                Ok(CounterReading {
                    next: current + 1,
                    mode: CounterMode::Synced,
                })
            }
            Err(e) => {
                log::warn!("Counter store unreachable on peek, using local value: {}", e);
                self.mark(CounterMode::Degraded);
                let current = self.local.read().await?;
                Ok(CounterReading {
                    next: current + 1,
                    mode: CounterMode::Degraded,
                })
            }
        }
    }

    /// Consume one number. Returns it together with the number to display next.
    pub async fn commit_next(&self) -> Result<CommitOutcome, CounterError> {
        match self.commit_remote().await {
            Ok(issued) => {
                if let Err(e) = self.local.write(issued).await {
                    log::warn!("Failed to mirror counter into local fallback: {}", e);
                }
                self.mark(CounterMode::Synced);
                Ok(CommitOutcome {
                    issued,
                    next: issued + 1,
                    mode: CounterMode::Synced,
                })
            }
            // The store answered, so the local file must not stand in for it.
            Err(e @ CounterError::Contended(_)) => {
                log::error!("Invoice counter '{}' not advanced: {}", self.key, e);
                Err(e)
            }
            Err(e) => {
                log::warn!(
                    "Counter store unreachable on commit, advancing local value (not safe for concurrent clients): {}",
                    e
                );
                self.mark(CounterMode::Degraded);
                let issued = self.local.read().await? + 1;
                self.local.write_unsynced(issued).await?;
                Ok(CommitOutcome {
                    issued,
                    next: issued + 1,
                    mode: CounterMode::Degraded,
                })
            }
        }
    }

    async fn commit_remote(&self) -> Result<u64, CounterError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let base = self.store.read(&self.key).await?.map(|r| r.count);
            let current = base.unwrap_or(0).max(self.unsynced_floor().await);
            let issued = current + 1;

            if self
                .store
                .compare_and_set(&self.key, base, CounterRecord::new(issued))
                .await?
            {
                log::debug!("Counter '{}' advanced to {}", self.key, issued);
                return Ok(issued);
            }

            log::debug!(
                "Counter '{}' changed underneath commit (attempt {}), retrying",
                self.key,
                attempt
            );
        }

        Err(CounterError::Contended(MAX_COMMIT_ATTEMPTS))
    }

    /// Administrative reset: both the remote and the local value go back to 0
    /// and numbers issued while degraded are forgotten.
    pub async fn reset(&self) -> Result<(), CounterError> {
        self.store.reset(&self.key).await?;
        self.local.write(0).await?;
        self.mark(CounterMode::Synced);
        log::warn!("Invoice counter '{}' was reset to 0", self.key);
        Ok(())
    }
}
