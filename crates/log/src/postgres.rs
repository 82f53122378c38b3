//! PostgreSQL conversation log.
//!
//! Uses the same `chat_messages` table shape as the SQLite backend, with a
//! `SERIAL` identity and `TIMESTAMPTZ` timestamps.
//!
//! # Feature gate
//!
//! This module is behind the `postgres` feature flag:
//!
//! ```toml
//! loremaster-log = { workspace = true, features = ["postgres"] }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loremaster_core::error::StorageError;
use loremaster_core::log::{ConversationLog, check_appendable};
use loremaster_core::turn::{Role, Turn};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chat_messages (
    id          SERIAL PRIMARY KEY,
    role        VARCHAR(20) NOT NULL,
    content     TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at ON chat_messages(created_at);
"#;

/// A PostgreSQL-backed conversation log.
pub struct PostgresLog {
    pool: PgPool,
}

impl PostgresLog {
    /// Connect to `database_url` and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(format!("PostgreSQL connection failed: {e}")))?;

        let log = Self { pool };
        log.migrate().await?;
        info!("Connected to PostgreSQL for conversation log");
        Ok(log)
    }

    /// Wrap an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and index if missing.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(format!("Migration failed: {e}")))?;

        debug!("PostgreSQL migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &PgRow) -> Result<Turn, StorageError> {
        let role: String = row
            .try_get("role")
            .map_err(|e| StorageError::Read(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StorageError::Read(format!("content column: {e}")))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| StorageError::Read(format!("created_at column: {e}")))?;

        Ok(Turn::new(Role::from_stored(&role), content, created_at))
    }
}

#[async_trait]
impl ConversationLog for PostgresLog {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn append(&self, turn: &Turn) -> Result<DateTime<Utc>, StorageError> {
        check_appendable(turn)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Write(format!("BEGIN failed: {e}")))?;

        // Serializes writers so id order and timestamp order agree.
        sqlx::query("LOCK TABLE chat_messages IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Write(format!("LOCK failed: {e}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO chat_messages (role, content, created_at)
            SELECT $1, $2, GREATEST($3, COALESCE(MAX(created_at), $3)) FROM chat_messages
            RETURNING created_at
            "#,
        )
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::Write(format!("INSERT failed: {e}")))?;

        let stored: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| StorageError::Write(format!("created_at column: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Write(format!("COMMIT failed: {e}")))?;

        debug!(role = %turn.role, chars = turn.content.len(), "Appended turn");
        Ok(stored)
    }

    async fn read_recent(&self, limit: Option<usize>) -> Result<Vec<Turn>, StorageError> {
        // LIMIT NULL means "no limit" in PostgreSQL.
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));

        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at FROM (
                SELECT id, role, content, created_at FROM chat_messages
                ORDER BY id DESC LIMIT $1
            ) recent ORDER BY id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Read(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM chat_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Read(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::Read(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }
}
