//! Deterministic mock provider.
//!
//! Substituted by the factory whenever `USE_MOCKS` is truthy. Serves
//! chat and streaming responses from embedded fixture files while
//! preserving every lifecycle invariant: exactly one terminal event,
//! populated metrics, cancellation honored, chat logs appended. Token
//! usage is deliberately unreported (all three keys null).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use prism_core::error::{ErrorCode, ProviderError};
use prism_core::message::ChatRequest;
use prism_core::model::Capability;
use prism_core::response::{ChatResponse, FinishReason, ProviderMetadata, TokenUsage};

use crate::chatlog::append_chat_log;
use crate::factory::ProviderServices;
use crate::observed::ObservationRecorder;
use crate::provider::{Provider, ProviderResult, StreamHandle};
use crate::streaming::{RawStarter, StreamContext, Translation, fail_stream, run_stream};

const CHAT_FIXTURE: &str = include_str!("../../fixtures/mock_chat.json");
const STREAM_FIXTURE: &str = include_str!("../../fixtures/mock_stream.json");

#[derive(Deserialize)]
struct ChatFixture {
    text: String,
    finish_reason: String,
}

#[derive(Deserialize)]
struct StreamFixture {
    request_id: Option<String>,
    response_id: Option<String>,
    deltas: Vec<String>,
}

/// Fixture-backed provider for tests and offline development.
pub struct MockProvider {
    services: ProviderServices,
}

impl MockProvider {
    /// New mock provider over the shared services.
    pub fn new(services: ProviderServices) -> Self {
        Self { services }
    }

    fn stream_context(&self, request: &ChatRequest) -> StreamContext {
        StreamContext {
            provider: "mock".to_owned(),
            model: request.model.clone(),
            start_timeout: self.services.start_timeout,
            retry: self.services.retry,
            controller: prism_core::cancel::StreamController::new(),
            exporter: self.services.exporter.clone(),
            metrics_repo: self.services.metrics_repo.clone(),
            correlation_id: request.correlation_id.clone(),
        }
    }
}

fn finish_reason_from(value: &str) -> FinishReason {
    match value {
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_use" => FinishReason::ToolUse,
        "error" => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-small"
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        request.validate().map_err(|e| {
            ProviderError::new(ErrorCode::BadRequest, e.to_string())
                .with_provider("mock")
                .with_operation("chat")
        })?;

        let fixture: ChatFixture = serde_json::from_str(CHAT_FIXTURE).map_err(|e| {
            ProviderError::internal(format!("invalid chat fixture: {e}"))
                .with_provider("mock")
                .with_operation("chat")
        })?;

        let mut metadata = ProviderMetadata::new("mock", request.model.clone());
        metadata.tokens = TokenUsage::unknown();

        let response = ChatResponse {
            text: fixture.text,
            finish_reason: finish_reason_from(&fixture.finish_reason),
            metadata,
            raw: Some(serde_json::from_str::<Value>(CHAT_FIXTURE).unwrap_or(Value::Null)),
        };

        let recorder =
            ObservationRecorder::new(self.services.observed.clone(), "mock");
        recorder.record_success(&request.model, Capability::Chat);

        append_chat_log(
            self.services.chat_logs.as_ref(),
            self.services.prefs.as_ref(),
            "mock",
            &request.model,
            request,
            Ok(&response),
        );
        Ok(response)
    }

    fn stream(&self, request: &ChatRequest) -> StreamHandle {
        let ctx = self.stream_context(request);
        let controller = ctx.controller.clone();

        if let Err(e) = request.validate() {
            let error = ProviderError::new(ErrorCode::BadRequest, e.to_string())
                .with_provider("mock")
                .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let recorder = Arc::new(ObservationRecorder::new(
            self.services.observed.clone(),
            "mock",
        ));
        let model = request.model.clone();

        let starter = move || {
            let recorder = recorder.clone();
            let model = model.clone();
            async move {
                let fixture: StreamFixture =
                    serde_json::from_str(STREAM_FIXTURE).map_err(|e| {
                        ProviderError::internal(format!("invalid stream fixture: {e}"))
                            .with_provider("mock")
                            .with_operation("stream")
                    })?;

                recorder.record_success(&model, Capability::Streaming);

                let chunks = futures::stream::iter(
                    fixture
                        .deltas
                        .into_iter()
                        .map(Ok::<_, ProviderError>),
                );
                Ok(RawStarter::Mapping {
                    stream: Some(Box::pin(chunks)),
                    request_id: fixture.request_id,
                    response_id: fixture.response_id,
                })
            }
        };

        StreamHandle {
            events: run_stream(ctx, starter, |chunk: String| Ok(Translation::delta(chunk))),
            controller,
        }
    }

    fn supports_streaming(&self, _model: &str) -> bool {
        true
    }

    fn supports_json_output(&self, _model: &str) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
