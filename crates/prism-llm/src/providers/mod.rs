//! Provider adapters.
//!
//! Each adapter translates [`ChatRequest`](prism_core::message::ChatRequest)
//! into its native payload, wraps the outbound call in the start-phase
//! guard and retry policy, normalizes the response, records capability
//! observations, appends the chat log, and (for streaming) composes the
//! streaming adapter with a starter and a translator.

pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::{OpenAiCompatProvider, OpenAiProfile};

use prism_core::error::{ProviderError, classify_status};
use prism_core::retry::parse_retry_after_header;

/// Normalize a non-success HTTP response into a classified error.
///
/// Extracts the provider's error message from the body when it follows
/// the common `{"error": {"message": ...}}` shape, and propagates a
/// `Retry-After` hint when present.
pub(crate) async fn http_error(
    provider: &str,
    operation: &str,
    response: reqwest::Response,
) -> ProviderError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after_header);
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .or_else(|| json.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));

    let mut err = ProviderError::new(classify_status(status), message)
        .with_provider(provider)
        .with_operation(operation);
    if let Some(ms) = retry_after {
        err = err.with_retry_after_ms(ms);
    }
    err
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
