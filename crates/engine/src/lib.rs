//! The chat orchestration engine.
//!
//! One request follows a **validate → record → recall → generate → record**
//! cycle:
//!
//! 1. **Receive** a player message
//! 2. **Record** it in the conversation log
//! 3. **Build context** (directive + most recent turns)
//! 4. **Generate** a reply through the candidate chain
//! 5. **Record** the reply and return it
//!
//! Concurrent requests share the log and adapter but nothing else.

pub mod context;
pub mod orchestrator;

pub use context::ContextBuilder;
pub use orchestrator::{ChatError, ChatReply, TurnOrchestrator, TurnStage};
