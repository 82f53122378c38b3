//! Conversation log trait: the append-only store of turns.
//!
//! The log is one global, totally ordered conversation. Turns are only ever
//! appended; nothing in this workspace updates or deletes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::turn::{Role, Turn};

/// The core ConversationLog trait.
///
/// Implementations: SQLite, PostgreSQL, in-memory (for testing).
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// The backend name (e.g., "sqlite", "postgres", "in_memory").
    fn name(&self) -> &str;

    /// Durably record a turn after every turn already recorded.
    ///
    /// Either the whole turn is stored or nothing is. Returns the timestamp
    /// actually stored, which is later than the turn's own when an earlier
    /// turn carries a later clock reading.
    async fn append(&self, turn: &Turn) -> Result<DateTime<Utc>, StorageError>;

    /// The most recent `limit` turns in ascending chronological order.
    ///
    /// `None` returns the whole log.
    async fn read_recent(&self, limit: Option<usize>) -> Result<Vec<Turn>, StorageError>;

    /// Number of stored turns.
    async fn count(&self) -> Result<usize, StorageError>;
}

/// Constraint check shared by every backend before a write.
pub fn check_appendable(turn: &Turn) -> Result<(), StorageError> {
    if turn.role == Role::Directive {
        return Err(StorageError::Rejected(
            "directive turns are never persisted".into(),
        ));
    }
    if turn.content.trim().is_empty() {
        return Err(StorageError::Rejected("turn content is empty".into()));
    }
    Ok(())
}
