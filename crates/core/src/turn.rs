//! Turn and role-message domain types.
//!
//! These are the value objects that flow through the whole system:
//! the caller submits text → it becomes a user [`Turn`] in the log → recent
//! turns become [`RoleMessage`]s for the backend → the reply becomes an
//! assistant [`Turn`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The player
    User,
    /// The generation backend
    Assistant,
    /// Fixed instructions; only ever synthesized, never stored
    Directive,
}

impl Role {
    /// The string stored in the log's `role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Directive => "directive",
        }
    }

    /// Parse a role read back from storage.
    ///
    /// Unknown values are treated as assistant turns so that a foreign row
    /// never gets replayed to the backend as player input.
    pub fn from_stored(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "directive" | "system" => Role::Directive,
            other => {
                warn!(role = %other, "Unknown stored role, treating as assistant");
                Role::Assistant
            }
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who said it
    pub role: Role,

    /// The text content (non-empty once persisted)
    pub content: String,

    /// When it was recorded
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a turn with an explicit timestamp.
    pub fn new(role: Role, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at,
        }
    }

    /// Create a user turn stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, Utc::now())
    }

    /// Create an assistant turn stamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, Utc::now())
    }
}

/// Role tag understood by the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A role-tagged message inside a context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMessage {
    pub role: MessageRole,
    pub content: String,
}

impl RoleMessage {
    /// The directive message that heads every context window.
    pub fn directive(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Map a stored turn onto the backend's two conversational roles.
    ///
    /// Anything that is not a user turn is sent as `assistant`.
    pub fn from_turn(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::User => MessageRole::User,
            Role::Assistant | Role::Directive => MessageRole::Assistant,
        };
        Self {
            role,
            content: turn.content.clone(),
        }
    }
}
