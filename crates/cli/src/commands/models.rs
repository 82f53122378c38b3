//! `loremaster models`: Check which candidate models are installed.

use super::load_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let adapter = loremaster_providers::build_from_config(&config)?;

    println!("🤖 Candidate Models");
    println!("===================");

    if let Err(e) = adapter.backend().ping().await {
        println!("  ❌ Backend unreachable: {e}");
        return Ok(());
    }

    let mut missing = Vec::new();
    for (i, (model, present)) in adapter.check_candidates().await.into_iter().enumerate() {
        if present {
            println!("  {}. ✅ {model}", i + 1);
        } else {
            println!("  {}. ❌ {model} (not installed)", i + 1);
            missing.push(model);
        }
    }

    if !missing.is_empty() {
        println!();
        for model in missing {
            println!("  Run: loremaster pull {model}");
        }
    }

    Ok(())
}
