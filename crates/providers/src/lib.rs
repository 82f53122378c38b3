//! Generation backend implementations for Loremaster.
//!
//! [`OllamaClient`] implements the `loremaster_core::ChatBackend` trait over
//! HTTP. [`GenerationAdapter`] walks the configured candidate chain on top
//! of any backend, with a bounded timeout per candidate.

pub mod address;
pub mod fallback;
pub mod ollama;

pub use address::resolve_base_url;
pub use fallback::{GenerationAdapter, build_from_config};
pub use ollama::OllamaClient;
