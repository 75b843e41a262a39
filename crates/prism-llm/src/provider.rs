//! The provider contract.
//!
//! Every backend implements [`Provider`]: a non-streaming `chat` call and
//! a `stream` call returning a [`StreamHandle`]. Capability support is
//! declared through explicit methods; host code branches on
//! `provider.supports_streaming(model)`, never on downcasts.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use prism_core::cancel::StreamController;
use prism_core::error::{ErrorCode, ProviderError, classify_status};
use prism_core::message::ChatRequest;
use prism_core::response::ChatResponse;
use prism_core::stream::ChatStreamEvent;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of normalized chat events.
///
/// Errors never appear as stream items; every failure surfaces as the
/// single terminal event's error string.
pub type ChatStream = Pin<Box<dyn Stream<Item = ChatStreamEvent> + Send>>;

/// A started stream plus its cancellation controller.
pub struct StreamHandle {
    /// Normalized event sequence: deltas then exactly one terminal.
    pub events: ChatStream,
    /// Cooperative cancellation handle.
    pub controller: StreamController,
}

impl StreamHandle {
    /// Request cooperative cancellation with a reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.controller.cancel(reason);
    }
}

/// Core LLM provider trait.
///
/// Implementors must be `Send + Sync`; each invocation is independent and
/// thread-safe. Adapters are forbidden from writing custom streaming
/// loops; `stream` must compose [`run_stream`](crate::streaming::run_stream)
/// with a starter and a translator.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Canonical provider name (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Non-streaming chat completion.
    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse>;

    /// Streaming chat. Never fails to return a handle; pre-flight
    /// failures surface as the stream's terminal event.
    fn stream(&self, request: &ChatRequest) -> StreamHandle;

    /// Whether the adapter declares streaming support for `model`.
    fn supports_streaming(&self, _model: &str) -> bool {
        true
    }

    /// Whether the adapter declares JSON output support for `model`.
    fn supports_json_output(&self, _model: &str) -> bool {
        false
    }

    /// Whether the adapter declares structured streaming for `model`.
    fn supports_structured_streaming(&self, _model: &str) -> bool {
        false
    }

    /// Whether the adapter declares tool use for `model`.
    fn supports_tool_use(&self, _model: &str) -> bool {
        false
    }
}

/// Classify a `reqwest` error deterministically.
///
/// Timeouts map to `timeout`, connect failures to `transient`, responses
/// by status code, body/decode failures to `provider`.
pub fn classify_reqwest(err: &reqwest::Error) -> ErrorCode {
    if err.is_timeout() {
        return ErrorCode::Timeout;
    }
    if err.is_connect() {
        return ErrorCode::Transient;
    }
    if let Some(status) = err.status() {
        return classify_status(status.as_u16());
    }
    if err.is_decode() || err.is_body() {
        return ErrorCode::Provider;
    }
    ErrorCode::Transient
}

/// Wrap a `reqwest` error into a classified [`ProviderError`].
pub fn provider_error_from_reqwest(
    provider: &str,
    operation: &str,
    err: reqwest::Error,
) -> ProviderError {
    let code = classify_reqwest(&err);
    ProviderError::new(code, err.to_string())
        .with_provider(provider)
        .with_operation(operation)
        .with_source(err)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
