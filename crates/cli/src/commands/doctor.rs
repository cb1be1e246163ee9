//! `mailmate doctor`: Diagnose configuration and provider health.

use std::time::Duration;

use mailmate_config::AppConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run() -> anyhow::Result<()> {
    println!("🩺 MailMate Doctor: System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults (run `mailmate init`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the config and re-run.");
            return Ok(());
        }
    };

    println!(
        "  ℹ️  Provider: {} at {} (model {})",
        config.provider.name, config.provider.api_url, config.provider.model
    );

    if config.has_api_key() {
        println!("  ✅ API key configured");
        match mailmate_providers::build_from_config(&config) {
            Ok(provider) => {
                match tokio::time::timeout(HEALTH_TIMEOUT, provider.health_check()).await {
                    Ok(Ok(true)) => println!("  ✅ Provider reachable"),
                    Ok(Ok(false)) => {
                        println!("  ⚠️  Provider answered but reported unhealthy");
                        issues += 1;
                    }
                    Ok(Err(e)) => {
                        println!("  ❌ Provider check failed: {e}");
                        issues += 1;
                    }
                    Err(_) => {
                        println!(
                            "  ❌ Provider did not answer within {}s",
                            HEALTH_TIMEOUT.as_secs()
                        );
                        issues += 1;
                    }
                }
            }
            Err(e) => {
                println!("  ❌ Could not build provider: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  No API key configured. Set MAILMATE_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
