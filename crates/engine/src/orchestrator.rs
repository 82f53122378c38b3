//! The turn orchestrator: one inbound message in, one recorded exchange out.
//!
//! Each request walks a fixed sequence of stages:
//!
//! 1. **Validating** the message is non-blank
//! 2. **PersistUserTurn** writes the trimmed message to the log
//! 3. **BuildContext** reads the recent log into a context window
//! 4. **Generate** runs the candidate chain
//! 5. **PersistAssistantTurn** writes the reply
//! 6. **Complete** returns it
//!
//! There are no retries here; resilience lives in the candidate chain.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loremaster_core::error::{GenerationError, StorageError};
use loremaster_core::log::ConversationLog;
use loremaster_core::turn::Turn;
use loremaster_providers::GenerationAdapter;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::context::ContextBuilder;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnStage {
    Received,
    Validating,
    PersistUserTurn,
    BuildContext,
    Generate,
    PersistAssistantTurn,
    Complete,
    Failed,
}

impl std::fmt::Display for TurnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TurnStage::Received => "received",
            TurnStage::Validating => "validating",
            TurnStage::PersistUserTurn => "persist_user_turn",
            TurnStage::BuildContext => "build_context",
            TurnStage::Generate => "generate",
            TurnStage::PersistAssistantTurn => "persist_assistant_turn",
            TurnStage::Complete => "complete",
            TurnStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The assistant turn handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Why a request did not complete.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message is required")]
    BadRequest,

    #[error("{source}")]
    Storage {
        stage: TurnStage,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The reply exists but the log did not take it.
    #[error("Reply was generated but not recorded: {source}")]
    Unrecorded {
        reply: ChatReply,
        #[source]
        source: StorageError,
    },

    #[error("Request interrupted: {0}")]
    Interrupted(String),
}

impl ChatError {
    /// The stage at which the request stopped.
    pub fn stage(&self) -> TurnStage {
        match self {
            ChatError::BadRequest => TurnStage::Validating,
            ChatError::Storage { stage, .. } => *stage,
            ChatError::Generation(_) => TurnStage::Generate,
            ChatError::Unrecorded { .. } => TurnStage::PersistAssistantTurn,
            ChatError::Interrupted(_) => TurnStage::Failed,
        }
    }
}

/// Sequences one chat request against the shared log and adapter.
pub struct TurnOrchestrator {
    log: Arc<dyn ConversationLog>,
    adapter: Arc<GenerationAdapter>,
    context: ContextBuilder,
}

impl TurnOrchestrator {
    pub fn new(
        log: Arc<dyn ConversationLog>,
        adapter: Arc<GenerationAdapter>,
        context: ContextBuilder,
    ) -> Self {
        Self {
            log,
            adapter,
            context,
        }
    }

    pub fn log(&self) -> &Arc<dyn ConversationLog> {
        &self.log
    }

    pub fn adapter(&self) -> &Arc<GenerationAdapter> {
        &self.adapter
    }

    /// Run one request to completion inside a span tagged with a fresh
    /// request id.
    pub async fn handle(&self, message: &str) -> Result<ChatReply, ChatError> {
        let span = info_span!("chat_turn", request_id = %Uuid::new_v4());
        async {
            let result = self.run(message).await;
            match &result {
                Ok(reply) => {
                    debug!(stage = %TurnStage::Complete, "Turn stage");
                    info!(chars = reply.content.len(), "Chat turn complete");
                }
                Err(ChatError::Unrecorded { source, .. }) => {
                    warn!(error = %source, "Reply delivered without being recorded");
                }
                Err(e) => {
                    debug!(stage = %TurnStage::Failed, "Turn stage");
                    error!(stage = %e.stage(), error = %e, "Chat turn failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Like [`handle`](Self::handle), but on its own task so that dropping
    /// the returned future does not abort a request already in flight.
    pub async fn submit(self: &Arc<Self>, message: String) -> Result<ChatReply, ChatError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.handle(&message).await })
            .await
            .map_err(|e| ChatError::Interrupted(e.to_string()))?
    }

    async fn run(&self, message: &str) -> Result<ChatReply, ChatError> {
        enter(TurnStage::Received);

        enter(TurnStage::Validating);
        let content = message.trim();
        if content.is_empty() {
            return Err(ChatError::BadRequest);
        }

        enter(TurnStage::PersistUserTurn);
        self.log
            .append(&Turn::user(content))
            .await
            .map_err(|source| ChatError::Storage {
                stage: TurnStage::PersistUserTurn,
                source,
            })?;

        enter(TurnStage::BuildContext);
        let window = self
            .context
            .build(self.log.as_ref())
            .await
            .map_err(|source| ChatError::Storage {
                stage: TurnStage::BuildContext,
                source,
            })?;

        enter(TurnStage::Generate);
        let text = self.adapter.generate(&window).await?;

        enter(TurnStage::PersistAssistantTurn);
        let turn = Turn::assistant(text);
        match self.log.append(&turn).await {
            Ok(stored_at) => Ok(ChatReply {
                content: turn.content,
                timestamp: stored_at,
            }),
            Err(source) => Err(ChatError::Unrecorded {
                reply: ChatReply {
                    content: turn.content,
                    timestamp: turn.created_at,
                },
                source,
            }),
        }
    }
}

fn enter(stage: TurnStage) {
    debug!(stage = %stage, "Turn stage");
}
