//! Configuration loading, validation, and management for Loremaster.
//!
//! Loads configuration from `~/.loremaster/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! [`AppConfig`] is built once and passed into constructors; nothing on the
//! request path reads the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directive prepended to every context window.
pub const DEFAULT_DIRECTIVE: &str = "You are an experienced Dungeon Master for Dungeons & Dragons 5th Edition. Your role is to:

1. Create immersive, engaging narratives and scenarios
2. Describe environments, NPCs, and situations vividly
3. Respond to player actions and decisions appropriately
4. Manage combat encounters when they arise
5. Ask for dice rolls when appropriate (ask players to roll d20, d6, etc.)
6. Maintain the fantasy atmosphere and stay in character
7. Be fair but challenging - create interesting dilemmas
8. Use \"you\" to address the players directly
9. Keep responses concise but descriptive (2-3 paragraphs max)

Start each session by setting the scene and asking what the players want to do. You control the world; the players control their characters' actions.";

/// Port Ollama listens on when an address does not name one.
pub const DEFAULT_BACKEND_PORT: u16 = 11434;

/// Log backends understood by [`LogConfig::backend`].
pub const LOG_BACKENDS: &[&str] = &["sqlite", "postgres", "memory"];

/// The root configuration structure.
///
/// Maps directly to `~/.loremaster/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation backend (Ollama) settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Conversation log storage
    #[serde(default)]
    pub log: LogConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Context window construction
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Address of the Ollama host. Schemeless values get `http://` and,
    /// when portless, the default port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Candidate chain, tried in order until one model answers
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

fn default_models() -> Vec<String> {
    vec!["llama2:7b".into()]
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            models: default_models(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// "sqlite" (default), "postgres", or "memory"
    #[serde(default = "default_log_backend")]
    pub backend: String,

    /// Connection string; SQLite defaults to a file in the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

fn default_log_backend() -> String {
    "sqlite".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            backend: default_log_backend(),
            database_url: None,
        }
    }
}

impl LogConfig {
    /// The connection string to use, filling in the SQLite default.
    pub fn resolved_database_url(&self) -> Option<String> {
        match (&self.database_url, self.backend.as_str()) {
            (Some(url), _) => Some(url.clone()),
            (None, "sqlite") => Some(format!(
                "sqlite://{}",
                AppConfig::config_dir().join("loremaster.db").display()
            )),
            _ => None,
        }
    }
}

/// Connection strings often embed a password; keep them out of logs.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogConfig")
            .field("backend", &self.backend)
            .field("database_url", &redact(&self.database_url))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    3001
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// How many recent turns follow the directive
    #[serde(default = "default_window")]
    pub window: usize,

    /// Replace the built-in Dungeon Master directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
}

fn default_window() -> usize {
    20
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            directive: None,
        }
    }
}

impl ContextConfig {
    /// The directive text in effect.
    pub fn directive_text(&self) -> &str {
        self.directive.as_deref().unwrap_or(DEFAULT_DIRECTIVE)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.loremaster/config.toml).
    ///
    /// Environment variables override the file:
    /// - `OLLAMA_URL`: backend address
    /// - `LOREMASTER_MODELS`: comma-separated candidate chain
    /// - `DATABASE_URL`: log connection string
    /// - `LOREMASTER_LOG_BACKEND`: log backend name
    /// - `PORT`: gateway port
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`AppConfig::load`]). Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("OLLAMA_URL") {
            self.backend.url = Some(url);
        }

        if let Some(models) = get("LOREMASTER_MODELS") {
            self.backend.models = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(url) = get("DATABASE_URL") {
            if url.starts_with("postgres") {
                self.log.backend = "postgres".into();
            }
            self.log.database_url = Some(url);
        }

        if let Some(backend) = get("LOREMASTER_LOG_BACKEND") {
            self.log.backend = backend.trim().to_ascii_lowercase();
        }

        if let Some(port) = get("PORT") {
            match port.trim().parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring unparseable PORT"),
            }
        }
    }

    /// Get the configuration directory path.
    ///
    /// `LOREMASTER_HOME` replaces the default `~/.loremaster`.
    pub fn config_dir() -> PathBuf {
        match std::env::var("LOREMASTER_HOME") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs_home().join(".loremaster"),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.window == 0 {
            return Err(ConfigError::ValidationError(
                "context.window must be at least 1".into(),
            ));
        }

        if self.backend.models.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.models must name at least one model".into(),
            ));
        }

        if self.backend.models.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "backend.models must not contain blank entries".into(),
            ));
        }

        if !LOG_BACKENDS.contains(&self.log.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log.backend '{}' is not one of {}",
                self.log.backend,
                LOG_BACKENDS.join(", ")
            )));
        }

        if self.log.backend == "postgres" && self.log.database_url.is_none() {
            return Err(ConfigError::ValidationError(
                "log.backend = \"postgres\" requires log.database_url or DATABASE_URL".into(),
            ));
        }

        if self
            .context
            .directive
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "context.directive must not be blank".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
