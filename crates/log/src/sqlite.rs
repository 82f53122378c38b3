//! SQLite conversation log.
//!
//! One table, `chat_messages`, ordered by its integer primary key.
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`)
//! so that string comparison matches chronological order.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use loremaster_core::error::StorageError;
use loremaster_core::log::{ConversationLog, check_appendable};
use loremaster_core::turn::{Role, Turn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// A durable SQLite-backed conversation log.
pub struct SqliteLog {
    pool: SqlitePool,
}

impl SqliteLog {
    /// Open (creating if needed) the database at `url`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Connection(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to open SQLite: {e}")))?;

        let log = Self { pool };
        log.run_migrations().await?;
        info!("SQLite conversation log initialized at {url}");
        Ok(log)
    }

    /// Wrap an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let log = Self { pool };
        log.run_migrations().await?;
        Ok(log)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                role        VARCHAR(20) NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
                            DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000Z', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("chat_messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at ON chat_messages(created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("created_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StorageError> {
        let role: String = row
            .try_get("role")
            .map_err(|e| StorageError::Read(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StorageError::Read(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::Read(format!("created_at column: {e}")))?;

        Ok(Turn::new(
            Role::from_stored(&role),
            content,
            parse_timestamp(&created_at)?,
        ))
    }
}

/// Canonical stored form of a timestamp.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and SQLite's own `CURRENT_TIMESTAMP` layout, so rows
/// written by other tools still read back.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| StorageError::Read(format!("Bad timestamp '{raw}': {e}")))
}

#[async_trait]
impl ConversationLog for SqliteLog {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, turn: &Turn) -> Result<DateTime<Utc>, StorageError> {
        check_appendable(turn)?;
        let created_at = format_timestamp(&turn.created_at);

        // A single statement, so the clamp and the insert are atomic.
        let row = sqlx::query(
            r#"
            INSERT INTO chat_messages (role, content, created_at)
            VALUES (?1, ?2, MAX(?3, COALESCE((SELECT MAX(created_at) FROM chat_messages), ?3)))
            RETURNING created_at
            "#,
        )
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Write(format!("INSERT failed: {e}")))?;

        let stored: String = row
            .try_get("created_at")
            .map_err(|e| StorageError::Write(format!("created_at column: {e}")))?;

        debug!(role = %turn.role, chars = turn.content.len(), "Appended turn");
        parse_timestamp(&stored)
    }

    async fn read_recent(&self, limit: Option<usize>) -> Result<Vec<Turn>, StorageError> {
        // LIMIT -1 means "no limit" in SQLite.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));

        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at FROM (
                SELECT id, role, content, created_at FROM chat_messages
                ORDER BY id DESC LIMIT ?1
            ) ORDER BY id ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Read(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM chat_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Read(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::Read(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }
}
