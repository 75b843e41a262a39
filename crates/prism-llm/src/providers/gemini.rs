//! Gemini `generateContent` adapter.
//!
//! Conversations map to `contents` with `user`/`model` roles and a
//! `systemInstruction`; JSON output rides on
//! `generationConfig.responseMimeType`. Streaming uses
//! `streamGenerateContent?alt=sse`, whose chunks carry partial candidate
//! text and, on the final chunk, `usageMetadata`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::error;

use prism_core::error::{ErrorCode, ProviderError, Stage};
use prism_core::message::{ChatRequest, ResponseFormat, Role};
use prism_core::model::Capability;
use prism_core::response::{ChatResponse, FinishReason, ProviderMetadata, TokenUsage};

use crate::chatlog::append_chat_log;
use crate::factory::ProviderServices;
use crate::observed::ObservationRecorder;
use crate::provider::{Provider, ProviderResult, StreamHandle, provider_error_from_reqwest};
use crate::providers::http_error;
use crate::sse::{SseParserOptions, parse_sse_lines};
use crate::streaming::{
    RawStarter, StreamContext, StreamMeta, Translation, fail_stream, run_stream,
    with_start_phase_retry,
};

/// Gemini adapter.
pub struct GeminiProvider {
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
    services: ProviderServices,
}

impl GeminiProvider {
    /// New adapter over a shared HTTP client.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        default_model: String,
        client: reqwest::Client,
        services: ProviderServices,
    ) -> Self {
        Self {
            base_url,
            api_key,
            default_model,
            client,
            services,
        }
    }

    fn method_url(&self, model: &str, method: &str, sse: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        let mut url = format!("{base}/models/{model}:{method}");
        if sse {
            url.push_str("?alt=sse");
        }
        url
    }

    fn recorder(&self) -> Arc<ObservationRecorder> {
        Arc::new(ObservationRecorder::new(
            self.services.observed.clone(),
            "gemini",
        ))
    }

    fn stream_context(&self, request: &ChatRequest) -> StreamContext {
        StreamContext {
            provider: "gemini".to_owned(),
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

/// Build the native `generateContent` payload.
fn build_payload(request: &ChatRequest) -> Value {
    let mut system_parts: Vec<Value> = Vec::new();
    let mut contents: Vec<Value> = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => {
                let trimmed = message.content.trim();
                if !trimmed.is_empty() {
                    system_parts.push(json!({"text": trimmed}));
                }
            }
            Role::User | Role::Tool => contents.push(json!({
                "role": "user",
                "parts": [{"text": message.content}],
            })),
            Role::Assistant => contents.push(json!({
                "role": "model",
                "parts": [{"text": message.content}],
            })),
        }
    }

    let mut payload = json!({ "contents": contents });
    if !system_parts.is_empty() {
        payload["systemInstruction"] = json!({"parts": system_parts});
    }

    let mut generation_config = serde_json::Map::new();
    if let Some(max_tokens) = request.max_tokens {
        let _ = generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
    }
    if let Some(temperature) = request.temperature {
        let _ = generation_config.insert("temperature".into(), json!(temperature));
    }
    match &request.response_format {
        ResponseFormat::Text => {}
        ResponseFormat::JsonObject => {
            let _ = generation_config
                .insert("responseMimeType".into(), json!("application/json"));
        }
        ResponseFormat::JsonSchema { schema } => {
            let _ = generation_config
                .insert("responseMimeType".into(), json!("application/json"));
            let _ = generation_config.insert("responseSchema".into(), schema.clone());
        }
    }
    if !generation_config.is_empty() {
        payload["generationConfig"] = Value::Object(generation_config);
    }
    if let Some(obj) = payload.as_object_mut() {
        for (key, value) in &request.extra {
            let _ = obj.insert(key.clone(), value.clone());
        }
    }
    payload
}

fn candidate_text(body: &Value) -> String {
    body["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn finish_reason_from(value: Option<&str>) -> FinishReason {
    match value {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn usage_from_body(usage: &Value) -> TokenUsage {
    TokenUsage {
        prompt: usage["promptTokenCount"].as_u64(),
        completion: usage["candidatesTokenCount"].as_u64(),
        total: usage["totalTokenCount"].as_u64(),
    }
}

/// Translate one SSE data chunk into a normalized translation.
fn translate_chunk(data: &str) -> Result<Translation, ProviderError> {
    let chunk: Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(ErrorCode::Provider, format!("unparseable stream chunk: {e}"))
    })?;

    let mut translation = Translation::default();
    if let Some(id) = chunk["responseId"].as_str() {
        translation.response_id = Some(id.to_owned());
    }
    let text = candidate_text(&chunk);
    if !text.is_empty() {
        translation.delta = Some(text);
    }
    let usage = &chunk["usageMetadata"];
    if usage.is_object() {
        translation.usage = Some(usage_from_body(usage));
    }
    Ok(translation)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        request.validate().map_err(|e| {
            ProviderError::new(ErrorCode::BadRequest, e.to_string())
                .with_provider("gemini")
                .with_operation("chat")
        })?;

        let recorder = self.recorder();
        let payload = build_payload(request);
        let url = self.method_url(&request.model, "generateContent", false);
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        let attempt = move || {
            let client = client.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let payload = payload.clone();
            async move {
                let mut builder = client.post(&url).json(&payload);
                if let Some(key) = &api_key {
                    builder = builder.query(&[("key", key.as_str())]);
                }
                let response = builder
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest("gemini", "chat", e))?;

                if !response.status().is_success() {
                    return Err(http_error("gemini", "chat", response).await);
                }

                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| provider_error_from_reqwest("gemini", "chat", e))?;
                Ok(body)
            }
        };
        let outcome = with_start_phase_retry(
            self.services.start_timeout,
            self.services.retry,
            "gemini",
            "chat",
            attempt,
        )
        .await;

        match outcome {
            Ok(body) => {
                let text = candidate_text(&body);
                let finish_reason =
                    finish_reason_from(body["candidates"][0]["finishReason"].as_str());

                let mut metadata = ProviderMetadata::new("gemini", request.model.clone());
                metadata.response_id = body["responseId"].as_str().map(ToOwned::to_owned);
                metadata.tokens = usage_from_body(&body["usageMetadata"]);

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
                    "gemini",
                    &request.model,
                    request,
                    Ok(&response),
                );
                Ok(response)
            }
            Err(err) => {
                if request.response_format.is_structured()
                    && err.code == ErrorCode::BadRequest
                    && err.message.to_lowercase().contains("response_mime_type")
                {
                    recorder.record_rejection(&request.model, Capability::JsonOutput);
                }
                error!(
                    provider = "gemini",
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
                    "gemini",
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
                .with_provider("gemini")
                .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let recorder = self.recorder();

        if request.response_format.is_structured()
            && !self.supports_structured_streaming(&request.model)
        {
            recorder.record_rejection(&request.model, Capability::StructuredStreaming);
            let error = ProviderError::unsupported(format!(
                "structured streaming not supported for model {}",
                request.model
            ))
            .with_provider("gemini")
            .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let payload = build_payload(request);
        let url = self.method_url(&request.model, "streamGenerateContent", true);
        let api_key = self.api_key.clone();
        let client = self.client.clone();
        let model = request.model.clone();

        let starter = move || {
            let client = client.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let payload = payload.clone();
            let recorder = recorder.clone();
            let model = model.clone();
            async move {
                let mut builder = client.post(&url).json(&payload);
                if let Some(key) = &api_key {
                    builder = builder.query(&[("key", key.as_str())]);
                }
                let response = builder
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest("gemini", "stream", e))?;

                if !response.status().is_success() {
                    return Err(http_error("gemini", "stream", response).await);
                }

                recorder.record_success(&model, Capability::Streaming);

                // Gemini may end the body without a trailing newline.
                let lines = parse_sse_lines(response.bytes_stream(), &SseParserOptions {
                    process_remaining_buffer: true,
                });
                let chunks = futures::StreamExt::map(lines, move |item| {
                    item.map_err(|e| {
                        provider_error_from_reqwest("gemini", "stream", e)
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

    fn supports_structured_streaming(&self, _model: &str) -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
