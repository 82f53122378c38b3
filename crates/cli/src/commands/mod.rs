pub mod doctor;
pub mod history;
pub mod models;
pub mod onboard;
pub mod pull;
pub mod serve;
pub mod status;

use loremaster_config::AppConfig;

/// Load config the same way for every command.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    check_log_backend(&config)?;
    Ok(config)
}

/// Refuse a log backend this binary was built without.
fn check_log_backend(config: &AppConfig) -> Result<(), String> {
    let backend = config.log.backend.as_str();
    if loremaster_log::is_available(backend) {
        return Ok(());
    }
    Err(format!(
        "log backend '{backend}' is not compiled into this binary; \
         rebuild with `--features {backend}` or set log.backend to \"sqlite\""
    ))
}
