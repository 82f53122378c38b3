//! `loremaster pull`: Download a model onto the backend host.

use super::load_config;

pub async fn run(model: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let adapter = loremaster_providers::build_from_config(&config)?;

    println!("📦 Pulling {model} (this can take several minutes)...");

    if adapter.ensure_model_pulled(model).await {
        println!("✅ {model} is ready");
        Ok(())
    } else {
        Err(format!("Could not pull {model}; see the log above for details").into())
    }
}
