//! Persistence record types: chat logs and metrics projections.
//!
//! Both are created exclusively by their repositories (IDs and
//! `created_at` are assigned on write) and immutable afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::stream::StreamMetrics;

/// One persisted chat invocation: request payload plus response (or error).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatLog {
    /// Row ID; `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Canonical provider name.
    pub provider: String,
    /// Model invoked.
    pub model: String,
    /// Full request payload, verbatim.
    pub request_payload: Value,
    /// Full response payload, or the error record.
    pub response_payload: Value,
    /// Assigned by the repository on write (ISO8601 UTC).
    #[serde(default)]
    pub created_at: String,
}

impl ChatLog {
    /// Build an unpersisted log entry.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        request_payload: Value,
        response_payload: Value,
    ) -> Self {
        Self {
            id: None,
            provider: provider.into(),
            model: model.into(),
            request_payload,
            response_payload,
            created_at: String::new(),
        }
    }
}

/// Persisted projection of [`StreamMetrics`] plus correlation fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Row ID; `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Canonical provider name.
    pub provider: String,
    /// Model invoked.
    pub model: String,
    /// Deltas delivered.
    pub emitted_count: u64,
    /// Milliseconds to first delta, when anything was emitted.
    pub ttft_ms: Option<u64>,
    /// Total duration in milliseconds.
    pub total_ms: u64,
    /// Normalized error code, `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Caller-supplied correlation token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Assigned by the repository on write (ISO8601 UTC).
    #[serde(default)]
    pub created_at: String,
}

impl MetricsRecord {
    /// Project terminal stream metrics into a persistable record.
    pub fn from_stream_metrics(
        provider: impl Into<String>,
        model: impl Into<String>,
        metrics: &StreamMetrics,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            id: None,
            provider: provider.into(),
            model: model.into(),
            emitted_count: metrics.emitted_count,
            ttft_ms: metrics.time_to_first_token_ms,
            total_ms: metrics.total_duration_ms,
            error_code: metrics.error_code,
            correlation_id,
            created_at: String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
