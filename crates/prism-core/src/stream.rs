//! Normalized stream events and terminal metrics.
//!
//! A stream is a sequence of zero or more [`ChatStreamEvent::Delta`]s
//! followed by exactly one [`ChatStreamEvent::Terminal`]. The terminal
//! carries [`StreamMetrics`] whose invariants are checkable in isolation:
//! the streaming adapter enforces them, tests verify them.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::response::TokenUsage;

/// One normalized event of a chat stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// An incremental text fragment.
    Delta {
        /// Text fragment.
        text: String,
        /// Zero-based emission index.
        index: u64,
    },
    /// The single finishing event of a stream.
    Terminal {
        /// Always `true`; kept on the wire for consumers that filter on it.
        finish: bool,
        /// `"<code>:<truncated message>"` on failure, absent on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Terminal metrics.
        metrics: StreamMetrics,
        /// Provider request ID, when the starter supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// Provider response ID, when the starter supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },
}

impl ChatStreamEvent {
    /// Build a delta event.
    pub fn delta(text: impl Into<String>, index: u64) -> Self {
        Self::Delta {
            text: text.into(),
            index,
        }
    }

    /// Whether this is the terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    /// The delta text, if this is a delta.
    pub fn delta_text(&self) -> Option<&str> {
        match self {
            Self::Delta { text, .. } => Some(text),
            Self::Terminal { .. } => None,
        }
    }
}

/// Terminal metrics of a single stream invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// Number of deltas delivered to the consumer.
    pub emitted_count: u64,
    /// `emitted_count > 0`, denormalized for exporters.
    pub emitted: bool,
    /// Milliseconds from start to first delta; `None` iff nothing emitted.
    pub time_to_first_token_ms: Option<u64>,
    /// Milliseconds from start to finalize; always set.
    pub total_duration_ms: u64,
    /// Token usage reported by the native stream, keys always present.
    pub tokens: TokenUsage,
    /// Normalized error code, `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl StreamMetrics {
    /// Metrics for a stream that failed before emitting anything.
    pub fn failed_at_start(total_duration_ms: u64, error_code: ErrorCode) -> Self {
        Self {
            emitted_count: 0,
            emitted: false,
            time_to_first_token_ms: None,
            total_duration_ms,
            tokens: TokenUsage::unknown(),
            error_code: Some(error_code),
        }
    }

    /// Check the cross-field invariants.
    ///
    /// - `emitted ⇔ emitted_count > 0`
    /// - `emitted_count == 0 ⇔ time_to_first_token_ms is None`
    /// - if emitted: `0 < time_to_first_token_ms ≤ total_duration_ms`
    pub fn invariants_hold(&self) -> bool {
        if self.emitted != (self.emitted_count > 0) {
            return false;
        }
        match self.time_to_first_token_ms {
            None => self.emitted_count == 0,
            Some(ttft) => {
                self.emitted_count > 0 && ttft > 0 && ttft <= self.total_duration_ms
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delta_accessors() {
        let event = ChatStreamEvent::delta("Hel", 0);
        assert!(!event.is_terminal());
        assert_eq!(event.delta_text(), Some("Hel"));
    }

    #[test]
    fn terminal_accessors() {
        let event = ChatStreamEvent::Terminal {
            finish: true,
            error: None,
            metrics: StreamMetrics::default(),
            request_id: None,
            response_id: None,
        };
        assert!(event.is_terminal());
        assert_eq!(event.delta_text(), None);
    }

    #[test]
    fn terminal_serde_shape() {
        let event = ChatStreamEvent::Terminal {
            finish: true,
            error: Some("timeout:deadline elapsed".into()),
            metrics: StreamMetrics::failed_at_start(1000, ErrorCode::Timeout),
            request_id: Some("req_1".into()),
            response_id: None,
        };
        let val = serde_json::to_value(&event).unwrap();
        assert_eq!(val["type"], "terminal");
        assert_eq!(val["finish"], true);
        assert_eq!(val["error"], "timeout:deadline elapsed");
        assert_eq!(val["metrics"]["error_code"], "timeout");
        assert!(val.get("response_id").is_none());
    }

    #[test]
    fn failed_at_start_metrics_hold_invariants() {
        let metrics = StreamMetrics::failed_at_start(42, ErrorCode::Internal);
        assert!(metrics.invariants_hold());
        assert_eq!(metrics.emitted_count, 0);
        assert!(metrics.time_to_first_token_ms.is_none());
    }

    #[test]
    fn emitted_requires_positive_ttft() {
        let metrics = StreamMetrics {
            emitted_count: 3,
            emitted: true,
            time_to_first_token_ms: Some(0),
            total_duration_ms: 10,
            tokens: TokenUsage::unknown(),
            error_code: None,
        };
        assert!(!metrics.invariants_hold());
    }

    #[test]
    fn emitted_flag_must_match_count() {
        let metrics = StreamMetrics {
            emitted_count: 0,
            emitted: true,
            time_to_first_token_ms: None,
            total_duration_ms: 10,
            tokens: TokenUsage::unknown(),
            error_code: None,
        };
        assert!(!metrics.invariants_hold());
    }

    #[test]
    fn ttft_cannot_exceed_total() {
        let metrics = StreamMetrics {
            emitted_count: 1,
            emitted: true,
            time_to_first_token_ms: Some(50),
            total_duration_ms: 49,
            tokens: TokenUsage::unknown(),
            error_code: None,
        };
        assert!(!metrics.invariants_hold());
    }

    proptest! {
        #[test]
        fn invariant_checker_accepts_consistent_metrics(
            emitted_count in 1u64..10_000,
            ttft in 1u64..5_000,
            extra in 0u64..5_000,
        ) {
            let metrics = StreamMetrics {
                emitted_count,
                emitted: true,
                time_to_first_token_ms: Some(ttft),
                total_duration_ms: ttft + extra,
                tokens: TokenUsage::unknown(),
                error_code: None,
            };
            prop_assert!(metrics.invariants_hold());
        }

        #[test]
        fn invariant_checker_rejects_ttft_without_emission(ttft in 1u64..5_000) {
            let metrics = StreamMetrics {
                emitted_count: 0,
                emitted: false,
                time_to_first_token_ms: Some(ttft),
                total_duration_ms: ttft,
                tokens: TokenUsage::unknown(),
                error_code: None,
            };
            prop_assert!(!metrics.invariants_hold());
        }
    }
}
