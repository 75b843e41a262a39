//! Model catalog types: capabilities, model info, registry snapshots, and
//! observed-capability records.
//!
//! Capabilities are never inferred from model names. A capability flag is
//! persisted only as an [`ObservedCapability`] backed by real provider
//! behavior; snapshot capabilities come from provider metadata.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A model capability tag. Closed set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Non-streaming chat completion.
    Chat,
    /// Incremental streaming.
    Streaming,
    /// JSON-object output mode.
    JsonOutput,
    /// Structured output while streaming.
    StructuredStreaming,
    /// Tool / function calling.
    ToolUse,
    /// Image inputs.
    Vision,
    /// Embedding generation.
    Embeddings,
    /// Responses-style API surface.
    ResponsesApi,
}

impl Capability {
    /// Wire-level string for this capability.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Streaming => "streaming",
            Self::JsonOutput => "json_output",
            Self::StructuredStreaming => "structured_streaming",
            Self::ToolUse => "tool_use",
            Self::Vision => "vision",
            Self::Embeddings => "embeddings",
            Self::ResponsesApi => "responses_api",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "streaming" => Ok(Self::Streaming),
            "json_output" => Ok(Self::JsonOutput),
            "structured_streaming" => Ok(Self::StructuredStreaming),
            "tool_use" => Ok(Self::ToolUse),
            "vision" => Ok(Self::Vision),
            "embeddings" => Ok(Self::Embeddings),
            "responses_api" => Ok(Self::ResponsesApi),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// Where a model record came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Mechanism: `"http"`, `"local_process"`, `"fixture"`.
    pub fetched_via: String,
    /// Source detail: URL or executable path.
    pub source: String,
}

/// Catalog entry for one model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// API model ID.
    pub id: String,
    /// Display name, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Context window in tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    /// Capabilities reported by provider metadata.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<Capability>,
    /// Provider-reported update date (ISO8601 UTC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Fetch provenance.
    #[serde(default)]
    pub provenance: Provenance,
}

impl ModelInfo {
    /// Build a bare entry for `id` with no metadata.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            context_length: None,
            capabilities: BTreeSet::new(),
            updated_at: None,
            provenance: Provenance::default(),
        }
    }
}

/// An ordered set of models persisted under one provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistrySnapshot {
    /// Canonical provider name.
    pub provider: String,
    /// Models in fetch order, unique by ID.
    pub models: Vec<ModelInfo>,
    /// When the snapshot was fetched (ISO8601 UTC).
    pub fetched_at: String,
}

impl ModelRegistrySnapshot {
    /// Build a snapshot, dropping duplicate model IDs (first occurrence wins).
    pub fn new(
        provider: impl Into<String>,
        models: Vec<ModelInfo>,
        fetched_at: impl Into<String>,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let models = models
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        Self {
            provider: provider.into(),
            models,
            fetched_at: fetched_at.into(),
        }
    }

    /// Empty snapshot for `provider`: what a registry read returns when
    /// nothing was ever persisted.
    pub fn empty(provider: impl Into<String>, fetched_at: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            models: Vec::new(),
            fetched_at: fetched_at.into(),
        }
    }

    /// Whether the snapshot carries no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// A persisted, evidence-backed capability observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservedCapability {
    /// Canonical provider name.
    pub provider: String,
    /// Model the observation is about.
    pub model_id: String,
    /// Observed feature.
    pub feature: Capability,
    /// `true` from a demonstrated success, `false` from an explicit rejection.
    pub value: bool,
    /// When observed (ISO8601 UTC).
    pub observed_at: String,
}

/// Split a `provider/model` reference into its parts.
///
/// `"openai/gpt-4o"` → `Some(("openai", "gpt-4o"))`; bare IDs return `None`.
pub fn split_model_ref(model_ref: &str) -> Option<(&str, &str)> {
    model_ref
        .split_once('/')
        .filter(|(p, m)| !p.is_empty() && !m.is_empty())
}

/// Strip an explicit provider prefix from a model reference, if present.
pub fn strip_provider_prefix(model_ref: &str) -> &str {
    split_model_ref(model_ref).map_or(model_ref, |(_, model)| model)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
