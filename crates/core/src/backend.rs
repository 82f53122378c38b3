//! ChatBackend trait: the abstraction over a generation host.
//!
//! A backend knows how to send a context window to one named model and get
//! the continuation text back. Which models to try, and in which order, is
//! decided by the caller; the backend only moves bytes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::turn::RoleMessage;

/// Sampling parameters sent with every generation call.
///
/// These are fixed for the whole process; requests cannot change them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Temperature (0.0 = deterministic, higher = more creative)
    pub temperature: f32,

    /// Nucleus-sampling threshold
    pub top_p: f32,

    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl SamplingOptions {
    pub const NARRATIVE: SamplingOptions = SamplingOptions {
        temperature: 0.8,
        top_p: 0.9,
        max_tokens: 1000,
    };
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::NARRATIVE
    }
}

/// The core ChatBackend trait.
///
/// Implemented by the Ollama HTTP client; tests use in-process stand-ins.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "ollama").
    fn name(&self) -> &str;

    /// Generate one continuation of `messages` with `model`.
    async fn chat(
        &self,
        model: &str,
        messages: &[RoleMessage],
        sampling: &SamplingOptions,
    ) -> Result<String, BackendError>;

    /// Models currently installed on the host.
    async fn list_models(&self) -> Result<Vec<String>, BackendError>;

    /// Download `model` onto the host, blocking until it is ready.
    async fn pull_model(&self, model: &str) -> Result<(), BackendError>;

    /// Can we reach the host at all?
    async fn ping(&self) -> Result<bool, BackendError> {
        self.list_models().await.map(|_| true)
    }
}
