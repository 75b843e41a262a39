//! Anthropic Messages API adapter.
//!
//! System messages become the `system` parameter, tool results become
//! `tool_result` content blocks, and the SSE event stream
//! (`message_start`, `content_block_delta`, `message_delta`, ...) is
//! translated into normalized deltas with usage folded in from the start
//! and delta events. The API has no JSON response mode, so structured
//! formats short-circuit as `unsupported`.

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

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Output token ceiling used when the request does not set one; the
/// Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API adapter.
pub struct AnthropicProvider {
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
    services: ProviderServices,
}

impl AnthropicProvider {
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

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    fn recorder(&self) -> Arc<ObservationRecorder> {
        Arc::new(ObservationRecorder::new(
            self.services.observed.clone(),
            "anthropic",
        ))
    }

    fn stream_context(&self, request: &ChatRequest) -> StreamContext {
        StreamContext {
            provider: "anthropic".to_owned(),
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

/// Build the native Messages API payload.
fn build_payload(request: &ChatRequest, stream: bool) -> Value {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut messages: Vec<Value> = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => {
                let trimmed = message.content.trim();
                if !trimmed.is_empty() {
                    system_parts.push(trimmed);
                }
            }
            Role::User => messages.push(json!({
                "role": "user",
                "content": message.content,
            })),
            Role::Assistant => messages.push(json!({
                "role": "assistant",
                "content": message.content,
            })),
            Role::Tool => messages.push(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": message.content,
                }],
            })),
        }
    }

    let mut payload = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": messages,
    });
    if !system_parts.is_empty() {
        payload["system"] = json!(system_parts.join("\n\n"));
    }
    if let Some(temperature) = request.temperature {
        payload["temperature"] = json!(temperature);
    }
    if let Some(tools) = &request.tools {
        payload["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
    }
    if stream {
        payload["stream"] = json!(true);
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
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolUse,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn usage_from_body(usage: &Value) -> TokenUsage {
    let prompt = usage["input_tokens"].as_u64();
    let completion = usage["output_tokens"].as_u64();
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

/// Convert an SSE `error` event into a stream item error so the
/// lifecycle machine classifies it as a mid-stream failure.
fn reject_error_events(data: String) -> Result<String, ProviderError> {
    let Ok(chunk) = serde_json::from_str::<Value>(&data) else {
        return Ok(data);
    };
    if chunk["type"].as_str() == Some("error") {
        let message = chunk["error"]["message"].as_str().unwrap_or("stream error");
        let code = match chunk["error"]["type"].as_str() {
            Some("overloaded_error") => ErrorCode::Transient,
            Some("rate_limit_error") => ErrorCode::RateLimit,
            Some("authentication_error") | Some("permission_error") => ErrorCode::Auth,
            Some("invalid_request_error") => ErrorCode::BadRequest,
            _ => ErrorCode::Provider,
        };
        return Err(ProviderError::new(code, message.to_owned())
            .with_provider("anthropic")
            .with_operation("stream"));
    }
    Ok(data)
}

/// Translate one SSE data chunk into a normalized translation.
fn translate_chunk(data: &str) -> Result<Translation, ProviderError> {
    let chunk: Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(ErrorCode::Provider, format!("unparseable stream chunk: {e}"))
    })?;

    let mut translation = Translation::default();
    match chunk["type"].as_str() {
        Some("message_start") => {
            if let Some(id) = chunk["message"]["id"].as_str() {
                translation.response_id = Some(id.to_owned());
            }
            if let Some(input) = chunk["message"]["usage"]["input_tokens"].as_u64() {
                translation.usage = Some(TokenUsage {
                    prompt: Some(input),
                    completion: None,
                    total: None,
                });
            }
        }
        Some("content_block_delta") => {
            if chunk["delta"]["type"].as_str() == Some("text_delta") {
                if let Some(text) = chunk["delta"]["text"].as_str() {
                    if !text.is_empty() {
                        translation.delta = Some(text.to_owned());
                    }
                }
            }
        }
        Some("message_delta") => {
            if let Some(output) = chunk["usage"]["output_tokens"].as_u64() {
                translation.usage = Some(TokenUsage {
                    prompt: None,
                    completion: Some(output),
                    total: None,
                });
            }
        }
        // ping, content_block_start, content_block_stop, message_stop
        _ => {}
    }
    Ok(translation)
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        request.validate().map_err(|e| {
            ProviderError::new(ErrorCode::BadRequest, e.to_string())
                .with_provider("anthropic")
                .with_operation("chat")
        })?;

        if request.response_format.is_structured() {
            return Err(ProviderError::unsupported(
                "json response formats are not supported by the messages API",
            )
            .with_provider("anthropic")
            .with_operation("chat"));
        }

        let recorder = self.recorder();
        let payload = build_payload(request, false);
        let url = self.messages_url();
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        let attempt = move || {
            let client = client.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let payload = payload.clone();
            async move {
                let mut builder = client
                    .post(&url)
                    .header("anthropic-version", API_VERSION)
                    .json(&payload);
                if let Some(key) = &api_key {
                    builder = builder.header("x-api-key", key);
                }
                let response = builder
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest("anthropic", "chat", e))?;

                if !response.status().is_success() {
                    return Err(http_error("anthropic", "chat", response).await);
                }

                let request_id = response
                    .headers()
                    .get("request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned);
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| provider_error_from_reqwest("anthropic", "chat", e))?;
                Ok((request_id, body))
            }
        };
        let outcome = with_start_phase_retry(
            self.services.start_timeout,
            self.services.retry,
            "anthropic",
            "chat",
            attempt,
        )
        .await;

        match outcome {
            Ok((request_id, body)) => {
                let text = body["content"]
                    .as_array()
                    .map(|blocks| {
                        blocks
                            .iter()
                            .filter(|b| b["type"].as_str() == Some("text"))
                            .filter_map(|b| b["text"].as_str())
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();
                let finish_reason = finish_reason_from(body["stop_reason"].as_str());

                let mut metadata = ProviderMetadata::new("anthropic", request.model.clone());
                metadata.request_id = request_id;
                metadata.response_id = body["id"].as_str().map(ToOwned::to_owned);
                metadata.tokens = usage_from_body(&body["usage"]);
                for key in ["cache_creation_input_tokens", "cache_read_input_tokens"] {
                    if let Some(count) = body["usage"][key].as_u64() {
                        let _ = metadata
                            .token_usage_details
                            .insert(key.to_owned(), json!(count));
                    }
                }

                let response = ChatResponse {
                    text,
                    finish_reason,
                    metadata,
                    raw: Some(body),
                };

                recorder.record_success(&request.model, Capability::Chat);
                if finish_reason == FinishReason::ToolUse {
                    recorder.record_success(&request.model, Capability::ToolUse);
                }

                append_chat_log(
                    self.services.chat_logs.as_ref(),
                    self.services.prefs.as_ref(),
                    "anthropic",
                    &request.model,
                    request,
                    Ok(&response),
                );
                Ok(response)
            }
            Err(err) => {
                error!(
                    provider = "anthropic",
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
                    "anthropic",
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
                .with_provider("anthropic")
                .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let recorder = self.recorder();

        if request.response_format != ResponseFormat::Text {
            recorder.record_rejection(&request.model, Capability::StructuredStreaming);
            let error = ProviderError::unsupported(format!(
                "structured streaming not supported for model {}",
                request.model
            ))
            .with_provider("anthropic")
            .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let payload = build_payload(request, true);
        let url = self.messages_url();
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
                let mut builder = client
                    .post(&url)
                    .header("anthropic-version", API_VERSION)
                    .json(&payload);
                if let Some(key) = &api_key {
                    builder = builder.header("x-api-key", key);
                }
                let response = builder
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest("anthropic", "stream", e))?;

                if !response.status().is_success() {
                    return Err(http_error("anthropic", "stream", response).await);
                }

                let request_id = response
                    .headers()
                    .get("request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned);

                recorder.record_success(&model, Capability::Streaming);

                let lines = parse_sse_lines(response.bytes_stream(), &SseParserOptions {
                    process_remaining_buffer: false,
                });
                let chunks = futures::StreamExt::map(lines, move |item| {
                    item.map_err(|e| {
                        provider_error_from_reqwest("anthropic", "stream", e)
                            .at_stage(Stage::MidStream)
                    })
                    .and_then(reject_error_events)
                });

                Ok(RawStarter::WithMeta(
                    Box::pin(chunks),
                    StreamMeta {
                        request_id,
                        response_id: None,
                    },
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
        false
    }

    fn supports_tool_use(&self, _model: &str) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::message::Message;

    fn request() -> ChatRequest {
        ChatRequest::new(
            "claude-sonnet-4-5",
            vec![Message::system("be brief"), Message::user("hi")],
        )
    }

    // ── build_payload ────────────────────────────────────────────────────

    #[test]
    fn payload_moves_system_out_of_messages() {
        let payload = build_payload(&request(), false);
        assert_eq!(payload["system"], "be brief");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
    }

    #[test]
    fn payload_requires_max_tokens() {
        let payload = build_payload(&request(), false);
        assert_eq!(payload["max_tokens"], DEFAULT_MAX_TOKENS);

        let mut req = request();
        req.max_tokens = Some(100);
        assert_eq!(build_payload(&req, false)["max_tokens"], 100);
    }

    #[test]
    fn payload_tool_result_becomes_content_block() {
        let req = ChatRequest::new(
            "claude-sonnet-4-5",
            vec![Message::tool("{\"temp\": 21}", "toolu_1")],
        );
        let payload = build_payload(&req, false);
        let block = &payload["messages"][0]["content"][0];
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "toolu_1");
    }

    #[test]
    fn payload_tools_use_input_schema() {
        let mut req = request();
        req.tools = Some(vec![prism_core::message::ToolSpec {
            name: "search".into(),
            description: None,
            parameters: json!({"type": "object"}),
        }]);
        let payload = build_payload(&req, false);
        assert_eq!(payload["tools"][0]["name"], "search");
        assert_eq!(payload["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn payload_whitespace_system_segments_dropped() {
        let req = ChatRequest::new(
            "claude-sonnet-4-5",
            vec![
                Message::system("  real instruction  "),
                Message::system("   "),
                Message::user("hi"),
            ],
        );
        let payload = build_payload(&req, false);
        assert_eq!(payload["system"], "real instruction");
    }

    // ── finish / usage ───────────────────────────────────────────────────

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(finish_reason_from(Some("end_turn")), FinishReason::Stop);
        assert_eq!(finish_reason_from(Some("max_tokens")), FinishReason::Length);
        assert_eq!(finish_reason_from(Some("tool_use")), FinishReason::ToolUse);
        assert_eq!(finish_reason_from(Some("refusal")), FinishReason::ContentFilter);
        assert_eq!(finish_reason_from(None), FinishReason::Stop);
    }

    #[test]
    fn usage_totals_input_and_output() {
        let usage = usage_from_body(&json!({"input_tokens": 10, "output_tokens": 4}));
        assert_eq!(usage.prompt, Some(10));
        assert_eq!(usage.completion, Some(4));
        assert_eq!(usage.total, Some(14));
    }

    #[test]
    fn usage_absent_is_all_null() {
        assert_eq!(usage_from_body(&Value::Null), TokenUsage::unknown());
    }

    // ── translate_chunk ──────────────────────────────────────────────────

    #[test]
    fn translate_message_start() {
        let translation = translate_chunk(
            r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":12}}}"#,
        )
        .unwrap();
        assert_eq!(translation.response_id.as_deref(), Some("msg_1"));
        assert_eq!(translation.usage.unwrap().prompt, Some(12));
        assert!(translation.delta.is_none());
    }

    #[test]
    fn translate_text_delta() {
        let translation = translate_chunk(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
        )
        .unwrap();
        assert_eq!(translation.delta.as_deref(), Some("Hel"));
    }

    #[test]
    fn translate_message_delta_usage() {
        let translation = translate_chunk(
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":27}}"#,
        )
        .unwrap();
        assert_eq!(translation.usage.unwrap().completion, Some(27));
    }

    #[test]
    fn translate_ping_is_skip() {
        let translation = translate_chunk(r#"{"type":"ping"}"#).unwrap();
        assert!(translation.delta.is_none());
        assert!(translation.usage.is_none());
    }

    // ── reject_error_events ──────────────────────────────────────────────

    #[test]
    fn error_event_becomes_stream_error() {
        let err = reject_error_events(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
                .to_owned(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Transient);
        assert_eq!(err.message, "Overloaded");
    }

    #[test]
    fn non_error_events_pass_through() {
        let data = r#"{"type":"ping"}"#.to_owned();
        assert_eq!(reject_error_events(data.clone()).unwrap(), data);
    }

    #[test]
    fn rate_limit_error_event_classified() {
        let err = reject_error_events(
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow"}}"#.to_owned(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimit);
    }
}
