//! # Loremaster Core
//!
//! Domain types, traits, and error definitions for the Loremaster chat
//! mediator. This crate has **no I/O dependencies**: it defines the domain
//! model that the storage, backend, and engine crates implement against.
//!
//! ## Design Philosophy
//!
//! Each external collaborator is a trait here:
//! - [`ConversationLog`]: the append-only turn store
//! - [`ChatBackend`]: the transport to a generation host
//!
//! Implementations live in their respective crates, which keeps the
//! orchestration engine testable with in-process stand-ins.

pub mod backend;
pub mod error;
pub mod log;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use backend::{ChatBackend, SamplingOptions};
pub use error::{BackendError, GenerationError, StorageError};
pub use log::ConversationLog;
pub use turn::{MessageRole, Role, RoleMessage, Turn};
