//! Ollama local daemon adapter.
//!
//! Talks to the daemon at `LOCAL_PROVIDER_HOST` over `/api/chat`. No API
//! key. Streaming is newline-delimited JSON rather than SSE; the final
//! object carries `done: true` plus eval counts, which map onto token
//! usage.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::error;

use prism_core::error::{ErrorCode, ProviderError, Stage};
use prism_core::message::{ChatRequest, ResponseFormat};
use prism_core::model::Capability;
use prism_core::response::{ChatResponse, FinishReason, ProviderMetadata, TokenUsage};

use crate::chatlog::append_chat_log;
use crate::factory::ProviderServices;
use crate::observed::ObservationRecorder;
use crate::provider::{Provider, ProviderResult, StreamHandle, provider_error_from_reqwest};
use crate::providers::http_error;
use crate::sse::{SseParserOptions, parse_json_lines};
use crate::streaming::{
    RawStarter, StreamContext, StreamMeta, Translation, fail_stream, run_stream,
    with_start_phase_retry,
};

/// Local Ollama adapter.
pub struct OllamaProvider {
    host: String,
    default_model: String,
    client: reqwest::Client,
    services: ProviderServices,
}

impl OllamaProvider {
    /// New adapter against the local daemon host.
    pub fn new(
        host: String,
        default_model: String,
        client: reqwest::Client,
        services: ProviderServices,
    ) -> Self {
        Self {
            host,
            default_model,
            client,
            services,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host.trim_end_matches('/'))
    }

    fn recorder(&self) -> Arc<ObservationRecorder> {
        Arc::new(ObservationRecorder::new(
            self.services.observed.clone(),
            "ollama",
        ))
    }

    fn stream_context(&self, request: &ChatRequest) -> StreamContext {
        StreamContext {
            provider: "ollama".to_owned(),
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

/// Build the native `/api/chat` payload.
fn build_payload(request: &ChatRequest, stream: bool) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| {
            json!({
                "role": m.role.as_str(),
                "content": m.content,
            })
        })
        .collect();

    let mut payload = json!({
        "model": request.model,
        "messages": messages,
        "stream": stream,
    });

    let mut options = serde_json::Map::new();
    if let Some(max_tokens) = request.max_tokens {
        let _ = options.insert("num_predict".into(), json!(max_tokens));
    }
    if let Some(temperature) = request.temperature {
        let _ = options.insert("temperature".into(), json!(temperature));
    }
    if !options.is_empty() {
        payload["options"] = Value::Object(options);
    }
    if request.response_format != ResponseFormat::Text {
        payload["format"] = json!("json");
    }
    if let Some(obj) = payload.as_object_mut() {
        for (key, value) in &request.extra {
            let _ = obj.insert(key.clone(), value.clone());
        }
    }
    payload
}

fn finish_reason_from(value: Option<&str>) -> FinishReason {
    match value {
        Some("length") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

fn usage_from_body(body: &Value) -> TokenUsage {
    let prompt = body["prompt_eval_count"].as_u64();
    let completion = body["eval_count"].as_u64();
    let total = match (prompt, completion) {
        (None, None) => None,
        (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
    };
    TokenUsage {
        prompt,
        completion,
        total,
    }
}

/// Translate one JSON line into a normalized translation.
fn translate_chunk(data: &str) -> Result<Translation, ProviderError> {
    let chunk: Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(ErrorCode::Provider, format!("unparseable stream chunk: {e}"))
    })?;

    let mut translation = Translation::default();
    if let Some(text) = chunk["message"]["content"].as_str() {
        if !text.is_empty() {
            translation.delta = Some(text.to_owned());
        }
    }
    if chunk["done"].as_bool() == Some(true) {
        translation.usage = Some(usage_from_body(&chunk));
    }
    Ok(translation)
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        request.validate().map_err(|e| {
            ProviderError::new(ErrorCode::BadRequest, e.to_string())
                .with_provider("ollama")
                .with_operation("chat")
        })?;

        let recorder = self.recorder();
        let payload = build_payload(request, false);
        let url = self.chat_url();
        let client = self.client.clone();

        let attempt = move || {
            let client = client.clone();
            let url = url.clone();
            let payload = payload.clone();
            async move {
                let response = client
                    .post(&url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest("ollama", "chat", e))?;

                if !response.status().is_success() {
                    return Err(http_error("ollama", "chat", response).await);
                }

                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| provider_error_from_reqwest("ollama", "chat", e))?;
                Ok(body)
            }
        };
        let outcome = with_start_phase_retry(
            self.services.start_timeout,
            self.services.retry,
            "ollama",
            "chat",
            attempt,
        )
        .await;

        match outcome {
            Ok(body) => {
                let text = body["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_owned();
                let finish_reason = finish_reason_from(body["done_reason"].as_str());

                let mut metadata = ProviderMetadata::new("ollama", request.model.clone());
                metadata.tokens = usage_from_body(&body);

                let response = ChatResponse {
                    text,
                    finish_reason,
                    metadata,
                    raw: Some(body),
                };

                recorder.record_success(&request.model, Capability::Chat);
                if request.response_format.is_structured()
                    && serde_json::from_str::<Value>(&response.text).is_ok()
                {
                    recorder.record_success(&request.model, Capability::JsonOutput);
                }

                append_chat_log(
                    self.services.chat_logs.as_ref(),
                    self.services.prefs.as_ref(),
                    "ollama",
                    &request.model,
                    request,
                    Ok(&response),
                );
                Ok(response)
            }
            Err(err) => {
                error!(
                    provider = "ollama",
                    operation = "chat",
                    stage = %err.stage,
                    failure_class = %err.code,
                    fallback_used = false,
                    error = %err,
                    "chat failed"
                );
                append_chat_log(
                    self.services.chat_logs.as_ref(),
                    self.services.prefs.as_ref(),
                    "ollama",
                    &request.model,
                    request,
                    Err(&err),
                );
                Err(err)
            }
        }
    }

    fn stream(&self, request: &ChatRequest) -> StreamHandle {
        let ctx = self.stream_context(request);
        let controller = ctx.controller.clone();

        if let Err(e) = request.validate() {
            let error = ProviderError::new(ErrorCode::BadRequest, e.to_string())
                .with_provider("ollama")
                .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let recorder = self.recorder();

        if request.response_format.is_structured() {
            recorder.record_rejection(&request.model, Capability::StructuredStreaming);
            let error = ProviderError::unsupported(format!(
                "structured streaming not supported for model {}",
                request.model
            ))
            .with_provider("ollama")
            .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let payload = build_payload(request, true);
        let url = self.chat_url();
        let client = self.client.clone();
        let model = request.model.clone();

        let starter = move || {
            let client = client.clone();
            let url = url.clone();
            let payload = payload.clone();
            let recorder = recorder.clone();
            let model = model.clone();
            async move {
                let response = client
                    .post(&url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest("ollama", "stream", e))?;

                if !response.status().is_success() {
                    return Err(http_error("ollama", "stream", response).await);
                }

                recorder.record_success(&model, Capability::Streaming);

                let lines = parse_json_lines(response.bytes_stream(), &SseParserOptions {
                    process_remaining_buffer: true,
                });
                let chunks = futures::StreamExt::map(lines, move |item| {
                    item.map_err(|e| {
                        provider_error_from_reqwest("ollama", "stream", e)
                            .at_stage(Stage::MidStream)
                    })
                });

                Ok(RawStarter::WithMeta(
                    Box::pin(chunks),
                    StreamMeta::default(),
                ))
            }
        };

        StreamHandle {
            events: run_stream(ctx, starter, |data: String| translate_chunk(&data)),
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
