//! Provider construction from a resolved model selection.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use homeclaw_config::{ConfigError, Credentials, ModelSelection, WireProtocol, find_provider};
use homeclaw_core::provider::Provider;
use std::sync::Arc;
use tracing::debug;

/// Build the provider for `selection`. No network I/O happens here, so an
/// unknown provider or a missing key fails before any request is sent.
pub fn build_provider(
    selection: &ModelSelection,
    credentials: &Credentials,
) -> Result<Arc<dyn Provider>, ConfigError> {
    let def = find_provider(&selection.provider).ok_or_else(|| {
        ConfigError::ValidationError(format!("unsupported provider '{}'", selection.provider))
    })?;

    let api_key = match &selection.api_key_env {
        Some(env_var) => Some(credentials.get(env_var).ok_or_else(|| {
            ConfigError::MissingCredential {
                provider: def.key.to_string(),
                env_var: env_var.clone(),
            }
        })?),
        None => None,
    };

    let base_url = selection
        .base_url
        .clone()
        .unwrap_or_else(|| def.base_url.to_string());

    let construct = |e: homeclaw_core::error::ProviderError| {
        ConfigError::ValidationError(format!("cannot construct provider '{}': {e}", def.key))
    };

    debug!(provider = def.key, model = %selection.model, "Building provider");

    match def.protocol {
        WireProtocol::Anthropic => {
            let Some(key) = api_key else {
                return Err(ConfigError::MissingCredential {
                    provider: def.key.to_string(),
                    env_var: def.api_key_env.unwrap_or("ANTHROPIC_API_KEY").to_string(),
                });
            };
            let provider = AnthropicProvider::new(key)
                .map_err(construct)?
                .with_base_url(base_url);
            Ok(Arc::new(provider))
        }
        WireProtocol::OpenAiCompatible => {
            let base_url = if def.key == "ollama" {
                ollama_v1(&base_url)
            } else {
                base_url
            };
            let provider =
                OpenAiCompatProvider::new(def.key, base_url, api_key).map_err(construct)?;
            Ok(Arc::new(provider))
        }
    }
}

/// Ollama serves the OpenAI-compatible API under `/v1`.
fn ollama_v1(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}
