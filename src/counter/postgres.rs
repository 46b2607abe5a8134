//! PostgreSQL-backed counter store.
//!
//! One row per counter key in `invoice_counters`. Updates are conditional on
//! the count the caller read, so two concurrent commits cannot both apply to
//! the same base value.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{CounterError, CounterRecord, CounterStore};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS invoice_counters (
    id TEXT PRIMARY KEY,
    count BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)"#;

#[derive(Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a lazily connecting pool, so an unreachable database at startup
    /// surfaces as degraded counter calls instead of a failed boot.
    pub fn connect_lazy(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(900))
            .max_lifetime(Duration::from_secs(1800))
            .connect_lazy(database_url)?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), CounterError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }
}

fn unavailable(e: sqlx::Error) -> CounterError {
    CounterError::Unavailable(e.to_string())
}

fn to_db_count(count: u64) -> Result<i64, CounterError> {
    i64::try_from(count)
        .map_err(|_| CounterError::Unavailable(format!("count {count} exceeds BIGINT range")))
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn read(&self, key: &str) -> Result<Option<CounterRecord>, CounterError> {
        let row: Option<(i64, DateTime<Utc>)> =
            sqlx::query_as("SELECT count, updated_at FROM invoice_counters WHERE id = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok(row.map(|(count, updated_at)| {
            let count = u64::try_from(count).unwrap_or_else(|_| {
                log::warn!("Counter '{}' holds negative value {}, treating it as 0", key, count);
                0
            });
            CounterRecord { count, updated_at }
        }))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        next: CounterRecord,
    ) -> Result<bool, CounterError> {
        let next_count = to_db_count(next.count)?;

        let result = match expected {
            None => {
                sqlx::query(
                    "INSERT INTO invoice_counters (id, count, updated_at) VALUES ($1, $2, $3) \
                     ON CONFLICT (id) DO NOTHING",
                )
                .bind(key)
                .bind(next_count)
                .bind(next.updated_at)
                .execute(&self.pool)
                .await
            }
            Some(expected) => {
                sqlx::query(
                    "UPDATE invoice_counters SET count = $3, updated_at = $4 \
                     WHERE id = $1 AND GREATEST(count, 0) = $2",
                )
                .bind(key)
                .bind(to_db_count(expected)?)
                .bind(next_count)
                .bind(next.updated_at)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn reset(&self, key: &str) -> Result<(), CounterError> {
        sqlx::query(
            "INSERT INTO invoice_counters (id, count, updated_at) VALUES ($1, 0, $2) \
             ON CONFLICT (id) DO UPDATE SET count = 0, updated_at = EXCLUDED.updated_at",
        )
        .bind(key)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(unavailable)
    }
}
