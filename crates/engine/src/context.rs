//! Context window assembly.
//!
//! A window is always one directive message followed by the most recent
//! `window` turns of the log, oldest first. Individual messages are never
//! truncated.

use loremaster_config::ContextConfig;
use loremaster_core::error::StorageError;
use loremaster_core::log::ConversationLog;
use loremaster_core::turn::RoleMessage;
use tracing::debug;

/// Builds bounded, role-tagged context windows from the log.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    directive: String,
    window: usize,
}

impl ContextBuilder {
    pub fn new(directive: impl Into<String>, window: usize) -> Self {
        Self {
            directive: directive.into(),
            window,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.directive_text(), config.window)
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Read the recent log and assemble the window.
    ///
    /// Length is `min(log length, window) + 1`.
    pub async fn build(&self, log: &dyn ConversationLog) -> Result<Vec<RoleMessage>, StorageError> {
        let turns = log.read_recent(Some(self.window)).await?;

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(RoleMessage::directive(self.directive.as_str()));
        messages.extend(turns.iter().map(RoleMessage::from_turn));

        debug!(turns = turns.len(), window = self.window, "Context window built");
        Ok(messages)
    }
}
