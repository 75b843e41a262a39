//! Retry policy and backoff calculation.
//!
//! The policy is pure configuration plus sync math; the async retry loop
//! lives in `prism-llm` next to the streaming adapter. Backoff uses full
//! jitter: the delay is drawn uniformly from `[0, min(max, base * 2^n))`.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Stage};

/// Default maximum attempts (initial call + retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 250;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Retry configuration for the start phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 250).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Delay cap in ms (default: 10000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Whether `code` may be retried at `stage` under this policy.
    ///
    /// The retryable set is `{transient, rate_limit}` plus `timeout`
    /// during the start phase only.
    pub fn allows(&self, code: ErrorCode, stage: Stage) -> bool {
        code.is_retryable_at(stage)
    }

    /// Exponential ceiling for a zero-based retry `attempt`, capped.
    pub fn backoff_ceiling_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(1u64 << attempt.min(31))
            .min(self.max_delay_ms)
    }

    /// Full-jitter delay for `attempt`, with `random` in `[0.0, 1.0)`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn backoff_delay_ms(&self, attempt: u32, random: f64) -> u64 {
        let ceiling = self.backoff_ceiling_ms(attempt);
        ((ceiling as f64) * random.clamp(0.0, 1.0)).round() as u64
    }

    /// Full-jitter delay using thread-local randomness.
    pub fn sample_backoff_ms(&self, attempt: u32) -> u64 {
        self.backoff_delay_ms(attempt, rand::random::<f64>())
    }
}

/// Parse a `Retry-After` HTTP header value into milliseconds.
///
/// Accepts integer seconds (`"120"`) or an HTTP-date. Past dates clamp to
/// zero; unparseable values return `None`.
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(seconds * 1000);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay_ms = date
            .signed_duration_since(chrono::Utc::now())
            .num_milliseconds();
        #[allow(clippy::cast_sign_loss)]
        return Some(if delay_ms > 0 { delay_ms as u64 } else { 0 });
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
