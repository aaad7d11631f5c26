//! PostgreSQL implementation of the watermark state store.
//!
//! Stores per-pass watermark instants in a `state` table to enable
//! incremental indexing across runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::errors::StateStoreError;
use crate::interfaces::StateStore;

/// PostgreSQL-backed watermark store.
///
/// Persists watermarks in a `state` table with upsert operations for
/// atomic updates.
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Creates a new state store over a configured connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn last_index_update(
        &self,
        key: &str,
    ) -> Result<Option<DateTime<Utc>>, StateStoreError> {
        let instant: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT value FROM state WHERE id = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(instant)
    }

    async fn save_last_index_update(
        &self,
        key: &str,
        instant: DateTime<Utc>,
    ) -> Result<(), StateStoreError> {
        sqlx::query(
            "INSERT INTO state (id, value) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET value = $2",
        )
        .bind(key)
        .bind(instant)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
