//! `loremaster status`: Show effective configuration.

use loremaster_config::AppConfig;
use loremaster_providers::resolve_base_url;

use super::load_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    println!("🎲 Loremaster Status");
    println!("====================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Backend:      {}", resolve_base_url(config.backend.url.as_deref()));
    println!("  Models:       {}", config.backend.models.join(", "));
    println!("  Log backend:  {}", config.log.backend);
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Window:       {} turns", config.context.window);
    println!(
        "  Directive:    {}",
        if config.context.directive.is_some() { "custom" } else { "built-in" }
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `loremaster onboard` first");
    }

    Ok(())
}
