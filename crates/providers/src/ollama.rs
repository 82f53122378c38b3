//! Ollama HTTP client.
//!
//! Speaks Ollama's native API rather than its OpenAI shim:
//! - `POST /api/chat` (non-streaming) for generation
//! - `GET /api/tags` for installed models
//! - `POST /api/pull` (non-streaming) to install a model

use std::time::Duration;

use async_trait::async_trait;
use loremaster_core::backend::{ChatBackend, SamplingOptions};
use loremaster_core::error::BackendError;
use loremaster_core::turn::RoleMessage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::resolve_base_url;

/// Upper bound on a blocking model download.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Listing installed models should be near-instant.
const TAGS_TIMEOUT: Duration = Duration::from_secs(10);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A client for a single Ollama host.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Build a client for `address` (see [`resolve_base_url`]).
    pub fn new(address: Option<&str>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: resolve_base_url(address),
            client,
        })
    }

    /// The resolved base URL every request is sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

/// Turn a non-success response into an error, preferring Ollama's
/// `{"error": "..."}` body over the raw text.
async fn api_error(response: reqwest::Response, model: Option<&str>) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    warn!(status, error = %message, "Ollama returned error");

    match (status, model) {
        (404, Some(model)) => BackendError::ModelNotFound(format!("{model}: {message}")),
        _ => BackendError::Api {
            status_code: status,
            message,
        },
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[RoleMessage],
        sampling: &SamplingOptions,
    ) -> Result<String, BackendError> {
        let body = ChatRequest {
            model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: sampling.temperature,
                top_p: sampling.top_p,
                num_predict: sampling.max_tokens,
            },
        };

        debug!(model, messages = messages.len(), "Sending chat request");

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(api_error(response, Some(model)).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let content = parsed
            .message
            .map(|m| m.content)
            .ok_or_else(|| BackendError::InvalidResponse("No message in response".into()))?;

        if content.trim().is_empty() {
            return Err(BackendError::EmptyResponse(model.to_string()));
        }

        Ok(content)
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(api_error(response, None).await);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse tags: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self, model: &str) -> Result<(), BackendError> {
        info!(model, "Pulling model");

        let response = self
            .client
            .post(self.url("/api/pull"))
            .timeout(PULL_TIMEOUT)
            .json(&serde_json::json!({
                "model": model,
                "name": model,
                "stream": false,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(api_error(response, None).await);
        }

        let status: PullResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse pull status: {e}")))?;

        if let Some(error) = status.error {
            return Err(BackendError::Api {
                status_code: 200,
                message: error,
            });
        }

        info!(model, status = %status.status.unwrap_or_default(), "Model pull finished");
        Ok(())
    }
}

// --- Ollama wire types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [RoleMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Deserialize)]
struct PullResponse {
    status: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}
