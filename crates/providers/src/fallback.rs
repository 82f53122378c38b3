//! Candidate fallback: ordered model chain with a per-candidate timeout.
//!
//! When a model fails (timeout, missing, empty reply, host error), the next
//! model in the configured chain is tried against the same backend. The
//! first non-empty reply wins.

use std::sync::Arc;
use std::time::Duration;

use loremaster_config::AppConfig;
use loremaster_core::backend::{ChatBackend, SamplingOptions};
use loremaster_core::error::{BackendError, GenerationError};
use loremaster_core::turn::RoleMessage;
use tracing::{info, warn};

use crate::ollama::OllamaClient;

/// Walks a fixed list of model identifiers over one backend.
pub struct GenerationAdapter {
    backend: Arc<dyn ChatBackend>,
    candidates: Vec<String>,
    sampling: SamplingOptions,
    timeout: Duration,
}

impl GenerationAdapter {
    /// How long a single candidate may take before it is abandoned.
    pub const CANDIDATE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create an adapter trying `candidates` in order.
    pub fn new(backend: Arc<dyn ChatBackend>, candidates: Vec<String>) -> Self {
        Self {
            backend,
            candidates,
            sampling: SamplingOptions::NARRATIVE,
            timeout: Self::CANDIDATE_TIMEOUT,
        }
    }

    /// Override the per-candidate timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Produce one reply for `context`, falling through the chain.
    ///
    /// Candidates after the first success are never contacted.
    pub async fn generate(&self, context: &[RoleMessage]) -> Result<String, GenerationError> {
        let mut last_error =
            BackendError::NotConfigured("No models in the candidate chain".into());
        let mut attempted = Vec::with_capacity(self.candidates.len());

        for (i, model) in self.candidates.iter().enumerate() {
            attempted.push(model.clone());

            info!(
                model = %model,
                attempt = i + 1,
                total = self.candidates.len(),
                "Fallback: trying model"
            );

            match tokio::time::timeout(
                self.timeout,
                self.backend.chat(model, context, &self.sampling),
            )
            .await
            {
                Ok(Ok(reply)) if !reply.trim().is_empty() => {
                    info!(model = %model, chars = reply.len(), "Fallback: model answered");
                    return Ok(reply);
                }
                Ok(Ok(_)) => {
                    warn!(model = %model, "Fallback: model returned empty reply, trying next");
                    last_error = BackendError::EmptyResponse(model.clone());
                }
                Ok(Err(e)) => {
                    warn!(
                        model = %model,
                        kind = e.kind(),
                        error = %e,
                        "Fallback: model failed, trying next"
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        model = %model,
                        timeout_secs = self.timeout.as_secs_f64(),
                        "Fallback: model timed out, trying next"
                    );
                    last_error = BackendError::Timeout(format!(
                        "Model '{}' timed out after {}s",
                        model,
                        self.timeout.as_secs()
                    ));
                }
            }
        }

        Err(GenerationError::new(attempted, last_error))
    }

    /// Is `model` installed on the host?
    ///
    /// An untagged name also matches its `:latest` tag. Any failure to ask
    /// the host counts as "not available".
    pub async fn is_model_available(&self, model: &str) -> bool {
        match self.backend.list_models().await {
            Ok(installed) => installed.iter().any(|name| model_matches(name, model)),
            Err(e) => {
                warn!(model, error = %e, "Could not list installed models");
                false
            }
        }
    }

    /// Install `model` unless it is already present.
    pub async fn ensure_model_pulled(&self, model: &str) -> bool {
        if self.is_model_available(model).await {
            return true;
        }

        match self.backend.pull_model(model).await {
            Ok(()) => true,
            Err(e) => {
                warn!(model, error = %e, "Model pull failed");
                false
            }
        }
    }

    /// Availability of every candidate, from a single listing.
    pub async fn check_candidates(&self) -> Vec<(String, bool)> {
        let installed = match self.backend.list_models().await {
            Ok(installed) => installed,
            Err(e) => {
                warn!(error = %e, "Could not list installed models");
                Vec::new()
            }
        };

        self.candidates
            .iter()
            .map(|model| {
                let present = installed.iter().any(|name| model_matches(name, model));
                (model.clone(), present)
            })
            .collect()
    }
}

fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || (!wanted.contains(':') && installed.strip_suffix(":latest") == Some(wanted))
}

/// Build the Ollama-backed adapter described by `config`.
pub fn build_from_config(config: &AppConfig) -> Result<GenerationAdapter, BackendError> {
    let client = OllamaClient::new(config.backend.url.as_deref())?;
    info!(
        url = %client.base_url(),
        models = ?config.backend.models,
        "Generation backend configured"
    );
    Ok(GenerationAdapter::new(
        Arc::new(client),
        config.backend.models.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loremaster_core::turn::MessageRole;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone)]
    enum Script {
        Reply(&'static str),
        Fail(BackendError),
        Hang,
    }

    /// A backend whose behavior is scripted per model.
    struct ScriptedBackend {
        scripts: HashMap<String, Script>,
        installed: Result<Vec<String>, BackendError>,
        pull_fails: bool,
        calls: Mutex<Vec<String>>,
        pulls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts
                    .iter()
                    .map(|(m, s)| (m.to_string(), s.clone()))
                    .collect(),
                installed: Ok(vec!["llama2:7b".into(), "mistral:latest".into()]),
                pull_fails: false,
                calls: Mutex::new(Vec::new()),
                pulls: Mutex::new(Vec::new()),
            }
        }

        fn unreachable() -> Self {
            let mut backend = Self::new(&[]);
            backend.installed = Err(BackendError::Network("connection refused".into()));
            backend
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn pulls(&self) -> Vec<String> {
            self.pulls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(
            &self,
            model: &str,
            _messages: &[RoleMessage],
            _sampling: &SamplingOptions,
        ) -> Result<String, BackendError> {
            self.calls.lock().unwrap().push(model.to_string());
            match self.scripts.get(model).cloned() {
                Some(Script::Reply(text)) => Ok(text.to_string()),
                Some(Script::Fail(e)) => Err(e),
                Some(Script::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                None => Err(BackendError::ModelNotFound(model.to_string())),
            }
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            self.installed.clone()
        }

        async fn pull_model(&self, model: &str) -> Result<(), BackendError> {
            self.pulls.lock().unwrap().push(model.to_string());
            if self.pull_fails {
                Err(BackendError::Api {
                    status_code: 500,
                    message: "disk full".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn context() -> Vec<RoleMessage> {
        vec![
            RoleMessage::directive("You are a DM"),
            RoleMessage {
                role: MessageRole::User,
                content: "I draw my sword".into(),
            },
        ]
    }

    fn adapter(backend: Arc<ScriptedBackend>, models: &[&str]) -> GenerationAdapter {
        GenerationAdapter::new(backend, models.iter().map(|m| m.to_string()).collect())
    }

    #[tokio::test]
    async fn first_candidate_succeeds() {
        let backend = Arc::new(ScriptedBackend::new(&[
            ("a", Script::Reply("The goblin flees.")),
            ("b", Script::Reply("unused")),
        ]));
        let adapter = adapter(backend.clone(), &["a", "b"]);

        let reply = adapter.generate(&context()).await.unwrap();
        assert_eq!(reply, "The goblin flees.");
        assert_eq!(backend.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn falls_through_to_third_and_stops() {
        let backend = Arc::new(ScriptedBackend::new(&[
            ("a", Script::Fail(BackendError::ModelNotFound("a".into()))),
            (
                "b",
                Script::Fail(BackendError::Api {
                    status_code: 500,
                    message: "runner crashed".into(),
                }),
            ),
            ("c", Script::Reply("A dragon descends.")),
            ("d", Script::Reply("unused")),
        ]));
        let adapter = adapter(backend.clone(), &["a", "b", "c", "d"]);

        let reply = adapter.generate(&context()).await.unwrap();
        assert_eq!(reply, "A dragon descends.");
        assert_eq!(backend.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn empty_reply_falls_through() {
        let backend = Arc::new(ScriptedBackend::new(&[
            ("a", Script::Reply("   ")),
            ("b", Script::Reply("The door opens.")),
        ]));
        let adapter = adapter(backend.clone(), &["a", "b"]);

        assert_eq!(adapter.generate(&context()).await.unwrap(), "The door opens.");
        assert_eq!(backend.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn all_candidates_fail_reports_last() {
        let backend = Arc::new(ScriptedBackend::new(&[
            ("a", Script::Fail(BackendError::Network("conn refused".into()))),
            ("b", Script::Fail(BackendError::ModelNotFound("b".into()))),
        ]));
        let adapter = adapter(backend.clone(), &["a", "b"]);

        let err = adapter.generate(&context()).await.unwrap_err();
        assert_eq!(err.attempted, vec!["a", "b"]);
        match err.last {
            BackendError::ModelNotFound(_) => {}
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_triggers_fallback() {
        let backend = Arc::new(ScriptedBackend::new(&[
            ("slow", Script::Hang),
            ("fast", Script::Reply("You arrive just in time.")),
        ]));
        let adapter =
            adapter(backend.clone(), &["slow", "fast"]).with_timeout(Duration::from_millis(50));

        let reply = adapter.generate(&context()).await.unwrap();
        assert_eq!(reply, "You arrive just in time.");
        assert_eq!(backend.calls(), vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn timeout_on_last_candidate_is_reported() {
        let backend = Arc::new(ScriptedBackend::new(&[("slow", Script::Hang)]));
        let adapter = adapter(backend, &["slow"]).with_timeout(Duration::from_millis(20));

        let err = adapter.generate(&context()).await.unwrap_err();
        assert_eq!(err.last.kind(), "timeout");
        assert!(err.to_string().contains("slow"));
    }

    #[tokio::test]
    async fn empty_chain_returns_not_configured() {
        let backend = Arc::new(ScriptedBackend::new(&[]));
        let adapter = adapter(backend.clone(), &[]);

        let err = adapter.generate(&context()).await.unwrap_err();
        assert!(err.attempted.is_empty());
        assert!(matches!(err.last, BackendError::NotConfigured(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn availability_matches_latest_tag() {
        let backend = Arc::new(ScriptedBackend::new(&[]));
        let adapter = adapter(backend, &["llama2:7b", "mistral", "phi3"]);

        assert!(adapter.is_model_available("llama2:7b").await);
        assert!(adapter.is_model_available("mistral").await);
        assert!(!adapter.is_model_available("llama2").await);
        assert!(!adapter.is_model_available("mistral:7b").await);

        let report = adapter.check_candidates().await;
        assert_eq!(
            report,
            vec![
                ("llama2:7b".to_string(), true),
                ("mistral".to_string(), true),
                ("phi3".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_host_means_unavailable() {
        let backend = Arc::new(ScriptedBackend::unreachable());
        let adapter = adapter(backend, &["llama2:7b"]);

        assert!(!adapter.is_model_available("llama2:7b").await);
        assert_eq!(
            adapter.check_candidates().await,
            vec![("llama2:7b".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn ensure_pulled_skips_installed_models() {
        let backend = Arc::new(ScriptedBackend::new(&[]));
        let adapter = adapter(backend.clone(), &[]);

        assert!(adapter.ensure_model_pulled("llama2:7b").await);
        assert!(backend.pulls().is_empty());

        assert!(adapter.ensure_model_pulled("phi3").await);
        assert_eq!(backend.pulls(), vec!["phi3"]);
    }

    #[tokio::test]
    async fn ensure_pulled_reports_failure() {
        let mut scripted = ScriptedBackend::new(&[]);
        scripted.pull_fails = true;
        let backend = Arc::new(scripted);
        let adapter = adapter(backend, &[]);

        assert!(!adapter.ensure_model_pulled("phi3").await);
    }

    #[test]
    fn builds_from_config() {
        let mut config = AppConfig::default();
        config.backend.url = Some("gpu-box".into());
        config.backend.models = vec!["mistral".into(), "llama2:7b".into()];

        let adapter = build_from_config(&config).unwrap();
        assert_eq!(adapter.candidates(), &["mistral", "llama2:7b"]);
        assert_eq!(adapter.backend().name(), "ollama");
    }
}
