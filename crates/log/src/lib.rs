//! Conversation log implementations for Loremaster.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use loremaster_config::LogConfig;
use loremaster_core::error::StorageError;
use loremaster_core::log::ConversationLog;
use tracing::info;

pub use in_memory::InMemoryLog;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLog;

#[cfg(feature = "postgres")]
pub use postgres::PostgresLog;

/// Whether this build can open the backend called `name`.
pub fn is_available(name: &str) -> bool {
    match name {
        "memory" => true,
        "sqlite" => cfg!(feature = "sqlite"),
        "postgres" => cfg!(feature = "postgres"),
        _ => false,
    }
}

/// Open the backend named by `config`.
pub async fn open(config: &LogConfig) -> Result<Arc<dyn ConversationLog>, StorageError> {
    let log: Arc<dyn ConversationLog> = match config.backend.as_str() {
        "memory" => Arc::new(InMemoryLog::new()),

        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let url = config
                .resolved_database_url()
                .ok_or_else(|| StorageError::Connection("no SQLite path".into()))?;
            if let Some(parent) = sqlite_parent_dir(&url) {
                tokio::fs::create_dir_all(&parent).await.map_err(|e| {
                    StorageError::Connection(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            Arc::new(SqliteLog::new(&url).await?)
        }

        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                StorageError::Connection("postgres backend needs database_url".into())
            })?;
            Arc::new(PostgresLog::connect(url).await?)
        }

        other => {
            return Err(StorageError::Connection(format!(
                "log backend '{other}' is not available in this build"
            )));
        }
    };

    info!(backend = log.name(), "Conversation log ready");
    Ok(log)
}

/// Directory holding a file-backed SQLite database, if any.
#[cfg(feature = "sqlite")]
fn sqlite_parent_dir(url: &str) -> Option<std::path::PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
}
