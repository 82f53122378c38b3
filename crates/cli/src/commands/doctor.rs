//! `loremaster doctor`: Diagnose config, storage and backend health.

use loremaster_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Loremaster Doctor — System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — using defaults (run `loremaster onboard`)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the configuration before running further checks.");
            return Ok(());
        }
    };

    match loremaster_log::open(&config.log).await {
        Ok(log) => match log.count().await {
            Ok(n) => println!("  ✅ Conversation log ({}) readable, {n} turns", log.name()),
            Err(e) => {
                println!("  ❌ Conversation log unreadable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Conversation log unavailable: {e}");
            issues += 1;
        }
    }

    match loremaster_providers::build_from_config(&config) {
        Ok(adapter) => match adapter.backend().ping().await {
            Ok(_) => {
                println!("  ✅ Generation backend reachable");
                for (model, present) in adapter.check_candidates().await {
                    if present {
                        println!("  ✅ Model {model} installed");
                    } else {
                        println!("  ⚠️  Model {model} not installed — run `loremaster pull {model}`");
                        issues += 1;
                    }
                }
            }
            Err(e) => {
                println!("  ❌ Generation backend unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Generation backend misconfigured: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
