//! Client router: builds the model client named by configuration.

use std::sync::Arc;
use tracing::debug;
use turngraph_core::error::ModelError;
use turngraph_core::model::{ModelClient, ModelConfig};

use crate::echo::EchoClient;
use crate::openai_compat::OpenAiCompatClient;

/// Build the model client for `config`.
///
/// `api_key` is passed separately so that [`ModelConfig`] stays free of
/// secrets and can cross an isolation boundary as-is.
pub fn build_client(
    config: &ModelConfig,
    api_key: Option<&str>,
) -> Result<Arc<dyn ModelClient>, ModelError> {
    debug!(provider = %config.provider, model = %config.model, "Building model client");

    if config.provider == "echo" {
        return Ok(Arc::new(EchoClient::new()));
    }

    let base_url = match (&config.api_url, default_base_url(&config.provider)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(ModelError::NotConfigured(format!(
                "provider '{}' needs model.api_url",
                config.provider
            )));
        }
    };

    let api_key = match api_key {
        Some(key) => key.to_string(),
        None if is_local(&config.provider) || config.api_url.is_some() => String::new(),
        None => {
            return Err(ModelError::NotConfigured(format!(
                "provider '{}' needs an API key (set TURNGRAPH_API_KEY)",
                config.provider
            )));
        }
    };

    let client = OpenAiCompatClient::new(&config.provider, base_url, api_key, &config.model)?
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    Ok(Arc::new(client))
}

/// Providers that run without credentials.
fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<&'static str> {
    let url = match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "fireworks" => "https://api.fireworks.ai/inference/v1",
        "vllm" => "http://localhost:8000/v1",
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1",
        _ => return None,
    };
    Some(url)
}
