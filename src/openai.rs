//! OpenAI-compatible client configuration.

use crate::config::GenerationSettings;
use crate::error::{AgentError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for API requests (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create a client for the public OpenAI API with the default timeout.
///
/// Used for Whisper transcription, which always goes to OpenAI.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with(OpenAIConfig::default(), Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create a client for the configured generation endpoint.
///
/// The endpoint may be any OpenAI-compatible server (vLLM, Ollama, ...). The API
/// key is read from the environment variable named in the settings; local servers
/// usually accept any value, so a missing key falls back to a placeholder.
pub fn create_generation_client(settings: &GenerationSettings) -> Result<Client<OpenAIConfig>> {
    let api_key = std::env::var(&settings.api_key_env).unwrap_or_else(|_| "none".to_string());

    let mut config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(base) = settings.base_url.as_deref().filter(|b| !b.is_empty()) {
        config = config.with_api_base(base);
    }

    create_client_with(config, Duration::from_secs(settings.request_timeout_secs))
}

fn create_client_with(config: OpenAIConfig, timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Client::with_config(config).with_http_client(http_client))
}
