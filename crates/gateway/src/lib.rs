//! HTTP API gateway for Loremaster.
//!
//! Exposes the chat surface the browser frontend talks to:
//! - `POST /api/chat`: one player turn in, one narrator turn out
//! - `GET /api/history`: the whole conversation, oldest first
//! - `GET /api/health`: liveness
//!
//! Built on Axum.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use loremaster_config::AppConfig;
use loremaster_core::turn::Turn;
use loremaster_engine::{ChatError, ContextBuilder, TurnOrchestrator};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<TurnOrchestrator>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - permissive CORS (the frontend dev server runs on another origin)
/// - request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/history", get(history_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire config → log → adapter → orchestrator.
pub async fn build_state(config: &AppConfig) -> Result<SharedState, Box<dyn std::error::Error>> {
    let log = loremaster_log::open(&config.log).await?;
    let adapter = Arc::new(loremaster_providers::build_from_config(config)?);

    // Startup diagnostics only; the server runs either way.
    match adapter.backend().ping().await {
        Ok(_) => {
            for (model, present) in adapter.check_candidates().await {
                if !present {
                    warn!(model = %model, "Candidate model is not installed; run `loremaster pull {model}`");
                }
            }
        }
        Err(e) => warn!(error = %e, "Generation backend is not reachable yet"),
    }

    let orchestrator = TurnOrchestrator::new(
        log,
        adapter,
        ContextBuilder::from_config(&config.context),
    );

    Ok(Arc::new(GatewayState {
        orchestrator: Arc::new(orchestrator),
    }))
}

/// Serve on an already-bound listener until the process stops.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    serve(listener, state).await
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Present (and `false`) only when the reply could not be logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, details: Option<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            details,
        }),
    )
}

// --- Handlers ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".into(),
        message: "Loremaster backend is running".into(),
    })
}

async fn history_handler(State(state): State<SharedState>) -> Result<Json<Vec<Turn>>, ApiError> {
    state
        .orchestrator
        .log()
        .read_recent(None)
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Failed to fetch chat history");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch chat history",
                None,
            )
        })
}

async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    // A malformed body is treated the same as a missing message.
    let Ok(Json(request)) = payload else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message is required", None));
    };

    match state.orchestrator.submit(request.message).await {
        Ok(reply) => Ok(Json(ChatResponse {
            message: reply.content,
            timestamp: reply.timestamp,
            recorded: None,
        })),
        Err(ChatError::BadRequest) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Message is required",
            None,
        )),
        Err(ChatError::Unrecorded { reply, .. }) => Ok(Json(ChatResponse {
            message: reply.content,
            timestamp: reply.timestamp,
            recorded: Some(false),
        })),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to process message",
            Some(e.to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use loremaster_core::backend::{ChatBackend, SamplingOptions};
    use loremaster_core::error::BackendError;
    use loremaster_core::log::ConversationLog;
    use loremaster_core::turn::RoleMessage;
    use loremaster_log::InMemoryLog;
    use loremaster_providers::GenerationAdapter;
    use tower::ServiceExt;

    /// Lightweight mock backend for gateway tests.
    struct MockBackend {
        reply: Option<String>,
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn chat(
            &self,
            _model: &str,
            _messages: &[RoleMessage],
            _sampling: &SamplingOptions,
        ) -> Result<String, BackendError> {
            self.reply
                .clone()
                .ok_or_else(|| BackendError::Network("connection refused".into()))
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["mock".into()])
        }

        async fn pull_model(&self, _model: &str) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn test_state(log: Arc<InMemoryLog>, reply: Option<&str>) -> SharedState {
        let backend = Arc::new(MockBackend {
            reply: reply.map(String::from),
        });
        let adapter = GenerationAdapter::new(backend, vec!["mock".into()]);
        let orchestrator = TurnOrchestrator::new(
            log,
            Arc::new(adapter),
            ContextBuilder::new("You are a DM", 20),
        );
        Arc::new(GatewayState {
            orchestrator: Arc::new(orchestrator),
        })
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_router(test_state(Arc::new(InMemoryLog::new()), None));

        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "OK");
    }

    #[tokio::test]
    async fn chat_returns_reply_and_records_it() {
        let log = Arc::new(InMemoryLog::new());
        let app = build_router(test_state(log.clone(), Some("The tavern falls silent.")));

        let response = app
            .oneshot(post_chat(r#"{"message": "I enter the tavern"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["message"], "The tavern falls silent.");
        assert!(json["timestamp"].is_string());
        assert!(json.get("recorded").is_none());
        assert_eq!(log.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn blank_or_missing_message_is_400() {
        let log = Arc::new(InMemoryLog::new());
        let state = test_state(log.clone(), Some("unused"));

        for body in [r#"{"message": "   "}"#, r#"{}"#, r#"{"message": 42}"#, "not json"] {
            let response = build_router(state.clone())
                .oneshot(post_chat(body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            let json = body_json(response).await;
            assert_eq!(json["error"], "Message is required");
        }
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn generation_failure_is_500_with_details() {
        let log = Arc::new(InMemoryLog::new());
        let app = build_router(test_state(log.clone(), None));

        let response = app
            .oneshot(post_chat(r#"{"message": "Hello?"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Failed to process message");
        assert!(json["details"].as_str().unwrap().contains("connection refused"));
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unrecorded_reply_is_still_delivered() {
        let log = Arc::new(InMemoryLog::new());
        log.fail_appends_after(1);
        let app = build_router(test_state(log, Some("A trapdoor opens.")));

        let response = app
            .oneshot(post_chat(r#"{"message": "I step forward"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["message"], "A trapdoor opens.");
        assert_eq!(json["recorded"], false);
    }

    #[tokio::test]
    async fn history_lists_turns_in_order() {
        let log = Arc::new(InMemoryLog::new());
        let state = test_state(log.clone(), Some("Welcome, adventurer."));

        build_router(state.clone())
            .oneshot(post_chat(r#"{"message": "Hi"}"#))
            .await
            .unwrap();

        let req = Request::builder()
            .uri("/api/history")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let turns = json.as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[0]["content"], "Hi");
        assert_eq!(turns[1]["role"], "assistant");
        assert!(turns[1]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn history_failure_is_500() {
        let log = Arc::new(InMemoryLog::new());
        log.set_fail_reads(true);
        let app = build_router(test_state(log, None));

        let req = Request::builder()
            .uri("/api/history")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Failed to fetch chat history");
    }

    #[tokio::test]
    async fn cors_preflight_is_allowed() {
        let app = build_router(test_state(Arc::new(InMemoryLog::new()), None));

        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/chat")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert!(response.status().is_success());
        assert!(
            response
                .headers()
                .contains_key("access-control-allow-origin")
        );
    }
}
