//! PostgreSQL backend for the history store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{HistoryStore, StoreResult};
use crate::config::DatabaseConfig;
use crate::types::{normalize_limit, HistoryEntry};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS history (
        id          TEXT PRIMARY KEY,
        prompt      TEXT,
        result      JSONB NOT NULL,
        source_ref  TEXT NOT NULL,
        "timestamp" TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS history_timestamp_idx
        ON history ("timestamp" DESC, id DESC)
"#;

/// PostgreSQL-backed store.
#[derive(Clone, Debug)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    /// Create a new store and connect to the database.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a clone of the database pool.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn init(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        tracing::debug!("history schema ensured");
        Ok(())
    }

    async fn insert(&self, entry: &HistoryEntry) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO history (id, prompt, result, source_ref, "timestamp")
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.prompt)
        .bind(&entry.result)
        .bind(&entry.source_ref)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn latest(&self, limit: i64) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT id, prompt, result, source_ref, "timestamp"
            FROM history
            ORDER BY "timestamp" DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(normalize_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self) -> StoreResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
