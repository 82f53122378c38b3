//! Error types for the Loremaster domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum.

use thiserror::Error;

// --- Conversation log errors ---

/// Failure of the durable conversation log.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Log storage unavailable: {0}")]
    Connection(String),

    #[error("Failed to append turn: {0}")]
    Write(String),

    #[error("Failed to read turns: {0}")]
    Read(String),

    #[error("Schema setup failed: {0}")]
    Migration(String),

    /// The turn violates a log constraint (empty content, directive role).
    #[error("Turn rejected by log: {0}")]
    Rejected(String),
}

// --- Generation backend errors ---

/// Why a single generation candidate failed.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Backend returned an error: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Model '{0}' produced an empty reply")]
    EmptyResponse(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Short machine-friendly label for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Network(_) => "network",
            BackendError::Timeout(_) => "timeout",
            BackendError::Api { .. } => "api",
            BackendError::ModelNotFound(_) => "model_not_found",
            BackendError::InvalidResponse(_) => "invalid_response",
            BackendError::EmptyResponse(_) => "empty_response",
            BackendError::NotConfigured(_) => "not_configured",
        }
    }
}

/// Every candidate in the fallback chain failed.
///
/// Only the final failure is retained; earlier ones survive as the ordered
/// list of attempted model identifiers.
#[derive(Debug, Clone, Error)]
#[error("Failed to generate a response: {last}")]
pub struct GenerationError {
    /// Model identifiers in the order they were tried.
    pub attempted: Vec<String>,

    /// The failure reported by the last candidate.
    #[source]
    pub last: BackendError,
}

impl GenerationError {
    pub fn new(attempted: Vec<String>, last: BackendError) -> Self {
        Self { attempted, last }
    }
}
