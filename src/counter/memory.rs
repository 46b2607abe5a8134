//! In-process counter store.
//!
//! Used when no database is configured and by the test suite. The outage
//! switch makes every call fail with [`CounterError::Unavailable`] so the
//! degraded path can be exercised without a real network failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CounterError, CounterRecord, CounterStore};

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    records: Mutex<HashMap<String, CounterRecord>>,
    offline: AtomicBool,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), CounterError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(CounterError::Unavailable(
                "in-memory store is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn read(&self, key: &str) -> Result<Option<CounterRecord>, CounterError> {
        self.check_online()?;
        Ok(self.records.lock().await.get(key).copied())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        next: CounterRecord,
    ) -> Result<bool, CounterError> {
        self.check_online()?;
        let mut records = self.records.lock().await;
        let current = records.get(key).map(|record| record.count);
        if current != expected {
            return Ok(false);
        }
        records.insert(key.to_string(), next);
        Ok(true)
    }

    async fn reset(&self, key: &str) -> Result<(), CounterError> {
        self.check_online()?;
        self.records
            .lock()
            .await
            .insert(key.to_string(), CounterRecord::new(0));
        Ok(())
    }
}
