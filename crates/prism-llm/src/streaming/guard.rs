//! Start-phase timeout guard.
//!
//! Wraps the portion of an invocation from issuing the request up to and
//! including the first observed chunk (streams) or the full response
//! (non-streaming). Only this interval is ever timeout-guarded; there is
//! no mid-stream timeout; callers cancel instead.

use std::future::Future;
use std::time::Duration;

use prism_core::error::{ErrorCode, ProviderError, Stage};

/// Run `operation` under the start-phase deadline.
///
/// The timer is scoped to this call and released on every exit path.
/// Nesting composes naturally: an inner guard's deadline expires on its
/// own without disturbing the outer one.
pub async fn with_start_phase<T, F>(timeout: Duration, operation: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_elapsed) => Err(ProviderError::new(
            ErrorCode::Timeout,
            format!("start phase timed out after {}ms", timeout.as_millis()),
        )
        .at_stage(Stage::Start)),
    }
}

/// Run `make_operation` under the start-phase guard with retries.
///
/// This is the non-streaming variant of the retry loop: the whole call is
/// the start phase, so the guard wraps each attempt in full. At most
/// `policy.max_attempts` attempts are made; on exhaustion the final
/// classified error surfaces unchanged.
pub async fn with_start_phase_retry<T, F, Fut>(
    timeout: Duration,
    policy: prism_core::retry::RetryPolicy,
    provider: &str,
    operation_name: &str,
    make_operation: F,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match with_start_phase(timeout, make_operation()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !policy.allows(err.code, Stage::Start) {
                    return Err(err);
                }
                let backoff_ms = policy.sample_backoff_ms(attempt - 1);
                let delay_ms = err.retry_after_ms.map_or(backoff_ms, |ra| backoff_ms.max(ra));
                tracing::warn!(
                    provider,
                    operation = operation_name,
                    stage = "retry",
                    attempt,
                    backoff_ms = delay_ms,
                    error_code = %err.code,
                    "retrying start phase"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
