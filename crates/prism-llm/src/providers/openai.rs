//! `OpenAI`-compatible chat adapter.
//!
//! `OpenAI`, `DeepSeek`, `OpenRouter`, and xAI all speak the same chat
//! completions wire shape; one adapter covers them, parameterized by an
//! [`OpenAiProfile`] carrying the canonical name and declared
//! capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::error;

use prism_core::error::{ErrorCode, ProviderError, Stage};
use prism_core::message::{ChatRequest, Message, ResponseFormat};
use prism_core::model::Capability;
use prism_core::response::{ChatResponse, FinishReason, ProviderMetadata, TokenUsage};

use crate::chatlog::append_chat_log;
use crate::factory::ProviderServices;
use crate::observed::ObservationRecorder;
use crate::provider::{
    Provider, ProviderResult, StreamHandle, provider_error_from_reqwest,
};
use crate::providers::http_error;
use crate::sse::{SseParserOptions, parse_sse_lines};
use crate::streaming::{
    RawStarter, StreamContext, StreamMeta, Translation, fail_stream, run_stream,
    with_start_phase_retry,
};

/// Static capability profile for one `OpenAI`-compatible provider.
#[derive(Clone, Copy, Debug)]
pub struct OpenAiProfile {
    /// Canonical provider name.
    pub name: &'static str,
    /// Declares JSON output mode.
    pub json_output: bool,
    /// Declares tool use.
    pub tool_use: bool,
    /// Declares structured output while streaming.
    pub structured_streaming: bool,
}

/// Adapter for the `OpenAI` chat completions wire shape.
pub struct OpenAiCompatProvider {
    profile: OpenAiProfile,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
    services: ProviderServices,
}

impl OpenAiCompatProvider {
    /// The `OpenAI` adapter.
    pub fn openai(
        base_url: String,
        api_key: Option<String>,
        default_model: String,
        client: reqwest::Client,
        services: ProviderServices,
    ) -> Self {
        Self::with_profile(
            OpenAiProfile {
                name: "openai",
                json_output: true,
                tool_use: true,
                structured_streaming: true,
            },
            base_url,
            api_key,
            default_model,
            client,
            services,
        )
    }

    /// The `DeepSeek` adapter.
    pub fn deepseek(
        base_url: String,
        api_key: Option<String>,
        default_model: String,
        client: reqwest::Client,
        services: ProviderServices,
    ) -> Self {
        Self::with_profile(
            OpenAiProfile {
                name: "deepseek",
                json_output: true,
                tool_use: true,
                structured_streaming: false,
            },
            base_url,
            api_key,
            default_model,
            client,
            services,
        )
    }

    /// The `OpenRouter` adapter.
    pub fn openrouter(
        base_url: String,
        api_key: Option<String>,
        default_model: String,
        client: reqwest::Client,
        services: ProviderServices,
    ) -> Self {
        Self::with_profile(
            OpenAiProfile {
                name: "openrouter",
                json_output: true,
                tool_use: true,
                structured_streaming: false,
            },
            base_url,
            api_key,
            default_model,
            client,
            services,
        )
    }

    /// The xAI adapter.
    pub fn xai(
        base_url: String,
        api_key: Option<String>,
        default_model: String,
        client: reqwest::Client,
        services: ProviderServices,
    ) -> Self {
        Self::with_profile(
            OpenAiProfile {
                name: "xai",
                json_output: true,
                tool_use: true,
                structured_streaming: false,
            },
            base_url,
            api_key,
            default_model,
            client,
            services,
        )
    }

    /// Adapter with an explicit profile (tests and custom endpoints).
    pub fn with_profile(
        profile: OpenAiProfile,
        base_url: String,
        api_key: Option<String>,
        default_model: String,
        client: reqwest::Client,
        services: ProviderServices,
    ) -> Self {
        Self {
            profile,
            base_url,
            api_key,
            default_model,
            client,
            services,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn recorder(&self) -> Arc<ObservationRecorder> {
        Arc::new(ObservationRecorder::new(
            self.services.observed.clone(),
            self.profile.name,
        ))
    }

    fn stream_context(&self, request: &ChatRequest) -> StreamContext {
        StreamContext {
            provider: self.profile.name.to_owned(),
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

fn message_json(message: &Message) -> Value {
    let mut value = json!({
        "role": message.role.as_str(),
        "content": message.content,
    });
    if let Some(name) = &message.name {
        value["name"] = json!(name);
    }
    if let Some(id) = &message.tool_call_id {
        value["tool_call_id"] = json!(id);
    }
    value
}

/// Build the native chat completions payload.
fn build_payload(request: &ChatRequest, stream: bool) -> Value {
    let mut payload = json!({
        "model": request.model,
        "messages": request.messages.iter().map(message_json).collect::<Vec<_>>(),
    });

    if let Some(max_tokens) = request.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        payload["temperature"] = json!(temperature);
    }
    match &request.response_format {
        ResponseFormat::Text => {}
        ResponseFormat::JsonObject => {
            payload["response_format"] = json!({"type": "json_object"});
        }
        ResponseFormat::JsonSchema { schema } => {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {"name": "response", "schema": schema},
            });
        }
    }
    if let Some(tools) = &request.tools {
        payload["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
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

fn usage_from_body(usage: &Value) -> (TokenUsage, Vec<(String, Value)>) {
    let tokens = TokenUsage {
        prompt: usage["prompt_tokens"].as_u64(),
        completion: usage["completion_tokens"].as_u64(),
        total: usage["total_tokens"].as_u64(),
    };
    let details = usage
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(key, _)| {
                    !matches!(
                        key.as_str(),
                        "prompt_tokens" | "completion_tokens" | "total_tokens"
                    )
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();
    (tokens, details)
}

fn finish_reason_from(value: Option<&str>) -> FinishReason {
    match value {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") => FinishReason::ToolUse,
        _ => FinishReason::Stop,
    }
}

/// Translate one SSE data chunk into a normalized translation.
fn translate_chunk(data: &str) -> Result<Translation, ProviderError> {
    let chunk: Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::new(ErrorCode::Provider, format!("unparseable stream chunk: {e}"))
    })?;

    let mut translation = Translation::default();
    if let Some(id) = chunk["id"].as_str() {
        translation.response_id = Some(id.to_owned());
    }
    if let Some(text) = chunk["choices"][0]["delta"]["content"].as_str() {
        if !text.is_empty() {
            translation.delta = Some(text.to_owned());
        }
    }
    let usage = &chunk["usage"];
    if usage.is_object() {
        translation.usage = Some(usage_from_body(usage).0);
    }
    Ok(translation)
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        self.profile.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        request.validate().map_err(|e| {
            ProviderError::new(ErrorCode::BadRequest, e.to_string())
                .with_provider(self.profile.name)
                .with_operation("chat")
        })?;

        let recorder = self.recorder();
        let payload = build_payload(request, false);
        let url = self.chat_url();
        let provider = self.profile.name;
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        let attempt = move || {
            let client = client.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let payload = payload.clone();
            async move {
                let mut http_request = client.post(&url).json(&payload);
                if let Some(key) = &api_key {
                    http_request = http_request.bearer_auth(key);
                }
                let response = http_request
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest(provider, "chat", e))?;

                if !response.status().is_success() {
                    return Err(http_error(provider, "chat", response).await);
                }

                let request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned);
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| provider_error_from_reqwest(provider, "chat", e))?;
                Ok((request_id, body))
            }
        };
        let outcome = with_start_phase_retry(
            self.services.start_timeout,
            self.services.retry,
            provider,
            "chat",
            attempt,
        )
        .await;

        match outcome {
            Ok((request_id, body)) => {
                let text = body["choices"][0]["message"]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_owned();
                let finish_reason =
                    finish_reason_from(body["choices"][0]["finish_reason"].as_str());
                let (tokens, details) = usage_from_body(&body["usage"]);

                let mut metadata = ProviderMetadata::new(provider, request.model.clone());
                metadata.request_id = request_id;
                metadata.response_id = body["id"].as_str().map(ToOwned::to_owned);
                metadata.tokens = tokens;
                metadata.token_usage_details = details.into_iter().collect();

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
                    provider,
                    &request.model,
                    request,
                    Ok(&response),
                );
                Ok(response)
            }
            Err(err) => {
                // An explicit 400 naming response_format is a rejection
                // of the JSON output feature, worth remembering.
                if request.response_format.is_structured()
                    && err.code == ErrorCode::BadRequest
                    && err.message.contains("response_format")
                {
                    recorder.record_rejection(&request.model, Capability::JsonOutput);
                }
                error!(
                    provider,
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
                    provider,
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
                .with_provider(self.profile.name)
                .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let recorder = self.recorder();

        if !self.supports_streaming(&request.model) {
            let error = ProviderError::unsupported(format!(
                "streaming not supported for model {}",
                request.model
            ))
            .with_provider(self.profile.name)
            .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        if request.response_format.is_structured()
            && !self.supports_structured_streaming(&request.model)
        {
            recorder.record_rejection(&request.model, Capability::StructuredStreaming);
            let error = ProviderError::unsupported(format!(
                "structured streaming not supported for model {}",
                request.model
            ))
            .with_provider(self.profile.name)
            .with_operation("stream");
            return StreamHandle {
                events: fail_stream(ctx, error),
                controller,
            };
        }

        let payload = build_payload(request, true);
        let url = self.chat_url();
        let api_key = self.api_key.clone();
        let client = self.client.clone();
        let provider = self.profile.name;
        let model = request.model.clone();

        let starter = move || {
            let client = client.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let payload = payload.clone();
            let recorder = recorder.clone();
            let model = model.clone();
            async move {
                let mut http_request = client.post(&url).json(&payload);
                if let Some(key) = &api_key {
                    http_request = http_request.bearer_auth(key);
                }
                let response = http_request
                    .send()
                    .await
                    .map_err(|e| provider_error_from_reqwest(provider, "stream", e))?;

                if !response.status().is_success() {
                    return Err(http_error(provider, "stream", response).await);
                }

                let request_id = response
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned);

                // A stream was opened: streaming is demonstrated.
                recorder.record_success(&model, Capability::Streaming);

                let lines = parse_sse_lines(response.bytes_stream(), &SseParserOptions {
                    process_remaining_buffer: false,
                });
                let chunks = futures::StreamExt::map(lines, move |item| {
                    item.map_err(|e| {
                        provider_error_from_reqwest(provider, "stream", e)
                            .at_stage(Stage::MidStream)
                    })
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
        self.profile.json_output
    }

    fn supports_structured_streaming(&self, _model: &str) -> bool {
        self.profile.structured_streaming
    }

    fn supports_tool_use(&self, _model: &str) -> bool {
        self.profile.tool_use
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::message::ToolSpec;

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4o", vec![Message::user("hi")])
    }

    // ── build_payload ────────────────────────────────────────────────────

    #[test]
    fn payload_minimal() {
        let payload = build_payload(&request(), false);
        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"], "hi");
        assert!(payload.get("stream").is_none());
        assert!(payload.get("max_tokens").is_none());
    }

    #[test]
    fn payload_with_options() {
        let mut req = request();
        req.max_tokens = Some(512);
        req.temperature = Some(0.2);
        req.response_format = ResponseFormat::JsonObject;
        let payload = build_payload(&req, true);
        assert_eq!(payload["max_tokens"], 512);
        assert_eq!(payload["temperature"], 0.2);
        assert_eq!(payload["response_format"]["type"], "json_object");
        assert_eq!(payload["stream"], true);
    }

    #[test]
    fn payload_json_schema_format() {
        let mut req = request();
        req.response_format = ResponseFormat::JsonSchema {
            schema: json!({"type": "object", "properties": {}}),
        };
        let payload = build_payload(&req, false);
        assert_eq!(payload["response_format"]["type"], "json_schema");
        assert_eq!(
            payload["response_format"]["json_schema"]["schema"]["type"],
            "object"
        );
    }

    #[test]
    fn payload_tools() {
        let mut req = request();
        req.tools = Some(vec![ToolSpec {
            name: "get_weather".into(),
            description: Some("Look up weather".into()),
            parameters: json!({"type": "object"}),
        }]);
        let payload = build_payload(&req, false);
        assert_eq!(payload["tools"][0]["type"], "function");
        assert_eq!(payload["tools"][0]["function"]["name"], "get_weather");
    }

    #[test]
    fn payload_extras_merge_verbatim() {
        let mut req = request();
        let _ = req.extra.insert("top_p".into(), json!(0.9));
        let _ = req.extra.insert("seed".into(), json!(7));
        let payload = build_payload(&req, false);
        assert_eq!(payload["top_p"], 0.9);
        assert_eq!(payload["seed"], 7);
    }

    #[test]
    fn payload_tool_message_carries_call_id() {
        let req = ChatRequest::new(
            "gpt-4o",
            vec![Message::tool("{\"ok\":true}", "call_9")],
        );
        let payload = build_payload(&req, false);
        assert_eq!(payload["messages"][0]["tool_call_id"], "call_9");
    }

    // ── usage / finish reason ────────────────────────────────────────────

    #[test]
    fn usage_extraction_with_details() {
        let usage = json!({
            "prompt_tokens": 10,
            "completion_tokens": 4,
            "total_tokens": 14,
            "prompt_tokens_details": {"cached_tokens": 8},
        });
        let (tokens, details) = usage_from_body(&usage);
        assert_eq!(tokens.prompt, Some(10));
        assert_eq!(tokens.total, Some(14));
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].0, "prompt_tokens_details");
    }

    #[test]
    fn usage_extraction_missing_is_null() {
        let (tokens, details) = usage_from_body(&Value::Null);
        assert_eq!(tokens, TokenUsage::unknown());
        assert!(details.is_empty());
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(finish_reason_from(Some("stop")), FinishReason::Stop);
        assert_eq!(finish_reason_from(Some("length")), FinishReason::Length);
        assert_eq!(
            finish_reason_from(Some("content_filter")),
            FinishReason::ContentFilter
        );
        assert_eq!(finish_reason_from(Some("tool_calls")), FinishReason::ToolUse);
        assert_eq!(finish_reason_from(None), FinishReason::Stop);
    }

    // ── translate_chunk ──────────────────────────────────────────────────

    #[test]
    fn translate_delta_chunk() {
        let translation = translate_chunk(
            r#"{"id":"chatcmpl-1","choices":[{"delta":{"content":"Hel"}}]}"#,
        )
        .unwrap();
        assert_eq!(translation.delta.as_deref(), Some("Hel"));
        assert_eq!(translation.response_id.as_deref(), Some("chatcmpl-1"));
    }

    #[test]
    fn translate_role_only_chunk_is_skip() {
        let translation =
            translate_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert!(translation.delta.is_none());
        assert!(translation.usage.is_none());
    }

    #[test]
    fn translate_usage_chunk() {
        let translation = translate_chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
        )
        .unwrap();
        let usage = translation.usage.unwrap();
        assert_eq!(usage.prompt, Some(5));
        assert_eq!(usage.total, Some(7));
    }

    #[test]
    fn translate_garbage_is_error() {
        assert!(translate_chunk("not json").is_err());
    }

    // ── profiles ─────────────────────────────────────────────────────────

    #[test]
    fn profiles_declare_expected_capabilities() {
        let services = ProviderServices::default();
        let client = reqwest::Client::new();
        let openai = OpenAiCompatProvider::openai(
            "https://api.openai.com/v1".into(),
            Some("sk-test".into()),
            "gpt-4o-mini".into(),
            client.clone(),
            services.clone(),
        );
        assert_eq!(openai.name(), "openai");
        assert!(openai.supports_json_output("gpt-4o"));
        assert!(openai.supports_structured_streaming("gpt-4o"));
        assert!(openai.supports_tool_use("gpt-4o"));

        let xai = OpenAiCompatProvider::xai(
            "https://api.x.ai/v1".into(),
            Some("xai-test".into()),
            "grok-2-latest".into(),
            client,
            services,
        );
        assert_eq!(xai.name(), "xai");
        assert!(!xai.supports_structured_streaming("grok-2-latest"));
    }
}
