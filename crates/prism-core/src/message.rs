//! Chat request and message types.
//!
//! [`ChatRequest`] is the single request DTO every provider adapter consumes.
//! Requests are caller-owned and adapter-read-only: adapters translate them
//! into native payloads but never mutate them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a chat message author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System / developer instruction.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
    /// Tool result turn.
    Tool,
}

impl Role {
    /// Wire-level string for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Optional author name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool call this message responds to (role = tool only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Build a tool-result message.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
        }
    }
}

/// Requested response format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Plain text (the default).
    #[default]
    Text,
    /// Any syntactically valid JSON object.
    JsonObject,
    /// JSON conforming to an explicit schema.
    JsonSchema {
        /// JSON Schema the output must satisfy.
        schema: Value,
    },
}

impl ResponseFormat {
    /// Whether this format requests structured (JSON) output.
    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// Tool definition passed through to the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the tool parameters.
    pub parameters: Value,
}

/// Validation failure for a [`ChatRequest`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InvalidRequest {
    /// `messages` was empty.
    #[error("messages must not be empty")]
    EmptyMessages,
    /// `max_tokens` was zero.
    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,
    /// `temperature` was outside `0..=2`.
    #[error("temperature {0} outside supported range 0..=2")]
    TemperatureOutOfRange(f64),
    /// `model` was empty or whitespace.
    #[error("model must not be empty")]
    EmptyModel,
}

/// A normalized chat request.
///
/// Immutable once constructed. Provider-opaque knobs go in `extra`; the core
/// never interprets them, adapters merge them into the native payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Target model ID.
    pub model: String,
    /// Ordered, non-empty conversation.
    pub messages: Vec<Message>,
    /// Maximum tokens to generate (> 0 if set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0..=2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Requested response format.
    #[serde(default)]
    pub response_format: ResponseFormat,
    /// Tool definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    /// Whether the caller intends to stream.
    #[serde(default)]
    pub stream: bool,
    /// Provider-opaque extras merged verbatim into the native payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
    /// Caller-supplied correlation token for log stitching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ChatRequest {
    /// Build a minimal request for `model` with `messages`.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            response_format: ResponseFormat::Text,
            tools: None,
            stream: false,
            extra: BTreeMap::new(),
            correlation_id: None,
        }
    }

    /// Validate the structural invariants.
    pub fn validate(&self) -> Result<(), InvalidRequest> {
        if self.model.trim().is_empty() {
            return Err(InvalidRequest::EmptyModel);
        }
        if self.messages.is_empty() {
            return Err(InvalidRequest::EmptyMessages);
        }
        if self.max_tokens == Some(0) {
            return Err(InvalidRequest::ZeroMaxTokens);
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(InvalidRequest::TemperatureOutOfRange(t));
            }
        }
        Ok(())
    }

    /// Join all user message contents into one prompt string.
    ///
    /// Whitespace-only segments are dropped; kept segments are trimmed
    /// before joining so padding never leaks into the prompt.
    pub fn joined_user_content(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
