//! `mailmate serve`: Start the HTTP relay gateway.

use anyhow::{Context, anyhow};
use mailmate_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        super::print_missing_key_help();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    println!("✉️  MailMate Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.provider.name, config.provider.model);

    mailmate_gateway::start(config)
        .await
        .map_err(|e| anyhow!(e))
        .context("Gateway stopped with an error")?;

    Ok(())
}
