//! LLM Provider implementations for MailMate.
//!
//! All providers implement the `mailmate_core::Provider` trait.
//! `build_from_config` constructs the configured provider at startup.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use mailmate_core::error::ProviderError;
use mailmate_core::provider::Provider;
use std::sync::Arc;

/// Build the configured provider.
///
/// Fails with `NotConfigured` when no API key is available, so a server
/// never starts against an endpoint it cannot authenticate with.
pub fn build_from_config(
    config: &mailmate_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key: set api_key in config.toml or MAILMATE_API_KEY".into(),
            )
        })?;

    tracing::info!(
        provider = %config.provider.name,
        url = %config.provider.api_url,
        model = %config.provider.model,
        "Provider configured"
    );

    Ok(Arc::new(OpenAiCompatProvider::new(
        config.provider.name.clone(),
        config.provider.api_url.clone(),
        api_key,
    )))
}
