//! `loremaster serve`: Start the HTTP chat server.

use super::load_config;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🎲 Loremaster");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Models:    {}", config.backend.models.join(" → "));
    println!("   Log:       {}", config.log.backend);

    loremaster_gateway::start(config).await?;

    Ok(())
}
