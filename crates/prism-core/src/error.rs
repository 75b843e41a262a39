//! Error taxonomy and classification.
//!
//! [`ErrorCode`] is the complete, closed set of codes the core produces.
//! Classification from native causes is deterministic: HTTP status and
//! message-pattern classifiers live here; transport-specific classifiers
//! (e.g. from `reqwest` errors) live next to the transport.

use serde::{Deserialize, Serialize};

use crate::text::{collapse_newlines, truncate_str};

/// Maximum length of the message part of a terminal error string.
pub const MAX_ERROR_MESSAGE_LEN: usize = 256;

/// Normalized error code. This is the complete set; nothing else is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Adapter or starter contract violation.
    Internal,
    /// Cooperative cancellation was observed.
    Cancelled,
    /// Start-phase deadline elapsed.
    Timeout,
    /// Transient transport or server failure.
    Transient,
    /// Provider rate limit.
    RateLimit,
    /// Credentials missing, invalid, or rejected.
    Auth,
    /// Malformed request.
    BadRequest,
    /// Unknown model, endpoint, or resource.
    NotFound,
    /// Feature not supported by provider/model.
    Unsupported,
    /// Provider-reported error with no better mapping.
    Provider,
    /// Unclassifiable cause.
    Unknown,
}

impl ErrorCode {
    /// Wire-level string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Transient => "transient",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
            Self::Unsupported => "unsupported",
            Self::Provider => "provider",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this code is retryable at the given stage.
    ///
    /// `cancelled` and `internal` are never retryable. `timeout` is
    /// retryable only while the start phase is in progress: once data
    /// flows there is nothing left to retry.
    pub fn is_retryable_at(self, stage: Stage) -> bool {
        match self {
            Self::Transient | Self::RateLimit => true,
            Self::Timeout => stage == Stage::Start,
            _ => false,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Self::Internal),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            "transient" => Ok(Self::Transient),
            "rate_limit" => Ok(Self::RateLimit),
            "auth" => Ok(Self::Auth),
            "bad_request" => Ok(Self::BadRequest),
            "not_found" => Ok(Self::NotFound),
            "unsupported" => Ok(Self::Unsupported),
            "provider" => Ok(Self::Provider),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown error code: {other}")),
        }
    }
}

/// Phase of an invocation where an error was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request issued, first chunk / full response not yet observed.
    Start,
    /// Native stream already flowing.
    MidStream,
    /// Terminal bookkeeping.
    Finalize,
    /// Between attempts in the retry loop.
    Retry,
}

impl Stage {
    /// Wire-level string for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::MidStream => "mid_stream",
            Self::Finalize => "finalize",
            Self::Retry => "retry",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider error.
///
/// Carries enough context for the normalized log record: provider,
/// operation, and the stage where the native cause was caught.
#[derive(Debug, thiserror::Error)]
#[error("{provider}/{operation} failed at {stage} ({code}): {message}")]
pub struct ProviderError {
    /// Normalized code.
    pub code: ErrorCode,
    /// Human-readable message from the native cause.
    pub message: String,
    /// Canonical provider name.
    pub provider: String,
    /// Logical operation (`"chat"`, `"stream"`, `"list_models"`, ...).
    pub operation: String,
    /// Stage where the cause was caught.
    pub stage: Stage,
    /// Whether the retry loop may absorb this error.
    pub retryable: bool,
    /// Provider-suggested retry delay (`Retry-After`), when present.
    pub retry_after_ms: Option<u64>,
    /// Native cause, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Build an error with retryability derived from `code` and `stage`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: String::new(),
            operation: String::new(),
            stage: Stage::Start,
            retryable: code.is_retryable_at(Stage::Start),
            retry_after_ms: None,
            source: None,
        }
    }

    /// Attach the provider name.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Attach the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Set the stage and recompute retryability for it.
    #[must_use]
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self.retryable = self.code.is_retryable_at(stage);
        self
    }

    /// Attach a provider-suggested retry delay.
    #[must_use]
    pub fn with_retry_after_ms(mut self, retry_after_ms: u64) -> Self {
        self.retry_after_ms = Some(retry_after_ms);
        self
    }

    /// Attach the native cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for an `internal` contract violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Shorthand for a cooperative cancellation.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, reason)
    }

    /// Shorthand for an unsupported feature.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }

    /// Format as a terminal error string: `"<code>:<truncated message>"`.
    ///
    /// Newlines are collapsed and the message is capped at
    /// [`MAX_ERROR_MESSAGE_LEN`] characters.
    pub fn terminal_string(&self) -> String {
        format_terminal_error(self.code, &self.message)
    }
}

/// Format `code` and `message` as a terminal error string.
pub fn format_terminal_error(code: ErrorCode, message: &str) -> String {
    let flat = collapse_newlines(message);
    format!("{}:{}", code.as_str(), truncate_str(&flat, MAX_ERROR_MESSAGE_LEN))
}

/// Classify an HTTP status code.
///
/// `408`/`5xx` → `transient`, `429` → `rate_limit`, `401`/`403` → `auth`,
/// `400` → `bad_request`, `404` → `not_found`; other 4xx map to
/// `provider` (the provider rejected the request for a reason the core
/// has no better name for).
pub fn classify_status(status: u16) -> ErrorCode {
    match status {
        400 => ErrorCode::BadRequest,
        401 | 403 => ErrorCode::Auth,
        404 => ErrorCode::NotFound,
        408 => ErrorCode::Transient,
        429 => ErrorCode::RateLimit,
        500..=599 => ErrorCode::Transient,
        402..=499 => ErrorCode::Provider,
        _ => ErrorCode::Unknown,
    }
}

/// Classify a native error message by pattern.
///
/// Used where only a stringly cause is available (local process output,
/// SDK messages). Checked in order; first match wins.
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    if lower.contains("cancel") {
        return ErrorCode::Cancelled;
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return ErrorCode::Timeout;
    }
    if lower.contains("rate limit") || lower.contains("too many requests") || message.contains("429")
    {
        return ErrorCode::RateLimit;
    }
    if lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("api key")
        || lower.contains("authentication")
        || message.contains("401")
        || message.contains("403")
    {
        return ErrorCode::Auth;
    }
    if lower.contains("not found") || message.contains("404") {
        return ErrorCode::NotFound;
    }
    if lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("overloaded")
        || message.contains("500")
        || message.contains("502")
        || message.contains("503")
    {
        return ErrorCode::Transient;
    }
    if lower.contains("invalid request") || message.contains("400") {
        return ErrorCode::BadRequest;
    }
    if lower.contains("unsupported") || lower.contains("not supported") {
        return ErrorCode::Unsupported;
    }
    ErrorCode::Unknown
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
