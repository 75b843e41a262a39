//! Normalized chat response types.
//!
//! Every adapter returns the same [`ChatResponse`] shape regardless of the
//! provider wire format. [`TokenUsage`] always serializes its three keys;
//! unknown counts are `null`, never omitted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of turn.
    Stop,
    /// Hit the output token limit.
    Length,
    /// Provider content filter intervened.
    ContentFilter,
    /// Model requested a tool invocation.
    ToolUse,
    /// Generation ended in an error.
    Error,
}

impl FinishReason {
    /// Wire-level string for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolUse => "tool_use",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting for one invocation.
///
/// The three keys are always present in serialized form. Values are `null`
/// when the provider did not report them. Provider-specific breakdowns
/// (cache reads, reasoning tokens, ...) belong in
/// [`ProviderMetadata::token_usage_details`], never here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt (input) tokens.
    pub prompt: Option<u64>,
    /// Completion (output) tokens.
    pub completion: Option<u64>,
    /// Total tokens.
    pub total: Option<u64>,
}

impl TokenUsage {
    /// Usage with all three counts unknown.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Usage from prompt and completion counts, totaling them.
    pub fn from_counts(prompt: u64, completion: u64) -> Self {
        Self {
            prompt: Some(prompt),
            completion: Some(completion),
            total: Some(prompt + completion),
        }
    }

    /// Whether any count is known.
    pub fn any_known(&self) -> bool {
        self.prompt.is_some() || self.completion.is_some() || self.total.is_some()
    }
}

/// Provider-level metadata attached to every response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Canonical provider name (e.g. `"openai"`).
    pub provider: String,
    /// Model that produced the response.
    pub model: String,
    /// Provider request ID, when surfaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Provider response ID, when surfaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// Normalized token usage; keys always present.
    pub tokens: TokenUsage,
    /// Provider-specific token breakdowns (cache reads, reasoning, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub token_usage_details: BTreeMap<String, Value>,
    /// Anything else worth carrying (system fingerprints, trace ids, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl ProviderMetadata {
    /// Metadata for `provider`/`model` with unknown token usage.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }
}

/// A normalized, non-streaming chat response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text.
    pub text: String,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Always-present provider metadata.
    pub metadata: ProviderMetadata,
    /// Raw native payload, for callers that need vendor fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
