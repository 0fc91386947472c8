//! LLM Provider implementations for HomeClaw.
//!
//! All providers implement the `homeclaw_core::Provider` trait.
//! [`build_provider`] picks the implementation for a resolved model choice.

pub mod anthropic;
pub mod factory;
pub mod openai_compat;

pub use anthropic::AnthropicProvider;
pub use factory::build_provider;
pub use openai_compat::OpenAiCompatProvider;

use homeclaw_core::error::ProviderError;
use std::time::Duration;
use tracing::warn;

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))
}

pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::from_transport(e.is_timeout(), e.to_string())
}

/// Map a non-success HTTP status to a provider error.
pub(crate) fn classify_status(status: u16, body: String) -> Option<ProviderError> {
    match status {
        200..=299 => None,
        429 => Some(ProviderError::RateLimited { retry_after_secs: 5 }),
        401 | 403 => Some(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => Some(ProviderError::ApiError {
            status_code: status,
            message: body,
        }),
    }
}

/// Pass a successful response through; turn anything else into an error.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(provider, status, "Provider returned error");
    Err(classify_status(status, body).unwrap_or(ProviderError::ApiError {
        status_code: status,
        message: "unexpected status".into(),
    }))
}
