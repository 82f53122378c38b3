//! In-memory log: useful for testing and throwaway sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loremaster_core::error::StorageError;
use loremaster_core::log::{ConversationLog, check_appendable};
use loremaster_core::turn::Turn;
use tokio::sync::RwLock;

const UNLIMITED: usize = usize::MAX;

/// A conversation log held in a Vec.
///
/// Failure switches let tests simulate an unavailable store.
pub struct InMemoryLog {
    turns: Arc<RwLock<Vec<Turn>>>,
    append_budget: AtomicUsize,
    fail_reads: AtomicBool,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
            append_budget: AtomicUsize::new(UNLIMITED),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Make every append fail (or succeed again).
    pub fn set_fail_appends(&self, fail: bool) {
        let budget = if fail { 0 } else { UNLIMITED };
        self.append_budget.store(budget, Ordering::SeqCst);
    }

    /// Let `n` more appends through, then fail the rest.
    pub fn fail_appends_after(&self, n: usize) {
        self.append_budget.store(n, Ordering::SeqCst);
    }

    /// Make every read fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn take_append_slot(&self) -> bool {
        self.append_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| match budget {
                0 => None,
                UNLIMITED => Some(UNLIMITED),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationLog for InMemoryLog {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, turn: &Turn) -> Result<DateTime<Utc>, StorageError> {
        check_appendable(turn)?;
        if !self.take_append_slot() {
            return Err(StorageError::Write("in-memory log is failing appends".into()));
        }

        let mut turns = self.turns.write().await;
        let mut stored = turn.clone();
        if let Some(last) = turns.last() {
            stored.created_at = stored.created_at.max(last.created_at);
        }
        let at = stored.created_at;
        turns.push(stored);
        Ok(at)
    }

    async fn read_recent(&self, limit: Option<usize>) -> Result<Vec<Turn>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Read("in-memory log is failing reads".into()));
        }

        let turns = self.turns.read().await;
        let skip = limit.map_or(0, |n| turns.len().saturating_sub(n));
        Ok(turns[skip..].to_vec())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Read("in-memory log is failing reads".into()));
        }
        Ok(self.turns.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use loremaster_core::turn::Role;

    #[tokio::test]
    async fn append_and_read_back() {
        let log = InMemoryLog::new();
        log.append(&Turn::user("I search the chest")).await.unwrap();
        log.append(&Turn::assistant("You find 12 gold pieces."))
            .await
            .unwrap();

        let turns = log.read_recent(None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "You find 12 gold pieces.");
        assert_eq!(log.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn read_recent_returns_newest_suffix() {
        let log = InMemoryLog::new();
        for i in 0..5 {
            log.append(&Turn::user(format!("turn {i}"))).await.unwrap();
        }

        let recent = log.read_recent(Some(2)).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 3", "turn 4"]);

        assert_eq!(log.read_recent(Some(50)).await.unwrap().len(), 5);
        assert!(log.read_recent(Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timestamps_never_go_backwards() {
        let log = InMemoryLog::new();
        let now = Utc::now();
        log.append(&Turn::new(Role::User, "first", now)).await.unwrap();
        log.append(&Turn::new(Role::Assistant, "skewed", now - Duration::seconds(30)))
            .await
            .unwrap();

        let turns = log.read_recent(None).await.unwrap();
        assert_eq!(turns[1].content, "skewed");
        assert!(turns[1].created_at >= turns[0].created_at);
    }

    #[tokio::test]
    async fn rejects_directive_and_blank_turns() {
        let log = InMemoryLog::new();
        let directive = Turn::new(Role::Directive, "You are a DM", Utc::now());
        assert!(matches!(
            log.append(&directive).await,
            Err(StorageError::Rejected(_))
        ));
        assert!(log.append(&Turn::user("  ")).await.is_err());
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_switches() {
        let log = InMemoryLog::new();
        log.fail_appends_after(1);
        assert!(log.append(&Turn::user("one")).await.is_ok());
        assert!(matches!(
            log.append(&Turn::user("two")).await,
            Err(StorageError::Write(_))
        ));

        log.set_fail_appends(false);
        assert!(log.append(&Turn::user("three")).await.is_ok());

        log.set_fail_reads(true);
        assert!(log.read_recent(None).await.is_err());
        log.set_fail_reads(false);
        assert_eq!(log.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn latest_append_reads_back_alone() {
        for input in ["I draw my sword", "Ich öffne die Tür", "竜に話しかける", "🐉 roar back!"] {
            let log = InMemoryLog::new();
            log.append(&Turn::assistant("The tavern falls quiet."))
                .await
                .unwrap();
            log.append(&Turn::user("I order an ale")).await.unwrap();
            log.append(&Turn::user(input.trim())).await.unwrap();

            let recent = log.read_recent(Some(1)).await.unwrap();
            assert_eq!(recent.len(), 1);
            assert_eq!(recent[0].role, Role::User);
            assert_eq!(recent[0].content, input);
        }
    }

    #[tokio::test]
    async fn append_returns_stored_timestamp() {
        let log = InMemoryLog::new();
        let now = Utc::now();
        let first = log.append(&Turn::new(Role::User, "first", now)).await.unwrap();
        let second = log
            .append(&Turn::new(Role::Assistant, "late", now - Duration::minutes(2)))
            .await
            .unwrap();

        assert_eq!(second, first);
        let turns = log.read_recent(None).await.unwrap();
        assert_eq!(turns[1].created_at, second);
    }
}
