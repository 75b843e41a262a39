//! The streaming lifecycle machine.
//!
//! One invocation walks `Init → Starting → Streaming → Finalized`. Every
//! path ends in `Finalized` with exactly one terminal event:
//!
//! 1. **Start**: the starter and the first native chunk run under the
//!    start-phase guard and retry policy. Terminal start failures finalize
//!    immediately with zero emissions.
//! 2. **Streaming**: chunks are translated one at a time. The
//!    cancellation token is checkpointed before each translation and
//!    after a successful drain. Translator failures are suppressed (the
//!    chunk is skipped); native iterator failures finalize with their
//!    classified code. No timeout applies mid-stream.
//! 3. **Finalize**, exactly once: metrics are frozen, the finalize log is
//!    written, the metrics record is persisted and exported best-effort,
//!    and the terminal event is yielded last.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use prism_core::cancel::StreamController;
use prism_core::error::{ProviderError, Stage};
use prism_core::ports::MetricsRepository;
use prism_core::records::MetricsRecord;
use prism_core::response::TokenUsage;
use prism_core::retry::RetryPolicy;
use prism_core::stream::{ChatStreamEvent, StreamMetrics};

use crate::metrics::MetricsExporter;
use crate::provider::ChatStream;
use crate::streaming::guard::with_start_phase;
use crate::streaming::starter::{NativeStream, RawStarter};

/// Everything one stream invocation needs besides its callbacks.
pub struct StreamContext {
    /// Canonical provider name, for logs and records.
    pub provider: String,
    /// Model invoked.
    pub model: String,
    /// Start-phase deadline.
    pub start_timeout: Duration,
    /// Start-phase retry policy.
    pub retry: RetryPolicy,
    /// Cooperative cancellation handle shared with the caller.
    pub controller: StreamController,
    /// Metrics exporter; `None` when export is gated off.
    pub exporter: Option<Arc<dyn MetricsExporter>>,
    /// Metrics persistence; `None` when no store is wired.
    pub metrics_repo: Option<Arc<dyn MetricsRepository>>,
    /// Caller-supplied correlation token.
    pub correlation_id: Option<String>,
}

impl StreamContext {
    /// Context with default timeout and retry policy and a fresh controller.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            start_timeout: Duration::from_secs(
                prism_settings::defaults::START_TIMEOUT_SECONDS,
            ),
            retry: RetryPolicy::default(),
            controller: StreamController::new(),
            exporter: None,
            metrics_repo: None,
            correlation_id: None,
        }
    }

    fn cancel_error(&self) -> ProviderError {
        ProviderError::cancelled(self.controller.reason_or_default())
            .with_provider(self.provider.clone())
            .with_operation("stream")
    }
}

/// What a translator extracted from one native chunk.
///
/// The default value means "nothing of interest; skip". A single chunk
/// may carry any combination of a delta, usage counts, and a response ID.
#[derive(Debug, Default)]
pub struct Translation {
    /// Text fragment to emit as a delta.
    pub delta: Option<String>,
    /// Token usage reported by this chunk; later chunks overwrite
    /// whichever counts they carry.
    pub usage: Option<TokenUsage>,
    /// Response ID surfaced by this chunk (first one wins).
    pub response_id: Option<String>,
}

impl Translation {
    /// A translation carrying only a text delta.
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            ..Self::default()
        }
    }

    /// A translation carrying nothing.
    pub fn skip() -> Self {
        Self::default()
    }
}

#[derive(Default)]
struct StreamState {
    emitted_count: u64,
    t_first: Option<Instant>,
    tokens: TokenUsage,
    request_id: Option<String>,
    response_id: Option<String>,
}

/// Run one streaming invocation from a starter and a translator.
///
/// This is the only streaming loop in the crate: adapters provide the two
/// callbacks and never iterate native streams themselves. The returned
/// stream yields deltas in production order followed by exactly one
/// terminal event.
pub fn run_stream<C, F, Fut, T>(ctx: StreamContext, starter: F, mut translator: T) -> ChatStream
where
    C: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<RawStarter<C>, ProviderError>> + Send,
    T: FnMut(C) -> Result<Translation, ProviderError> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let t_start = Instant::now();
        let mut state = StreamState::default();
        let mut failure: Option<ProviderError> = None;

        // ── Start phase: starter + first chunk, guarded and retried ──
        let mut attempt: u32 = 0;
        let mut native: Option<NativeStream<C>> = None;
        let mut first_chunk: Option<C> = None;
        let mut drained_at_start = false;

        loop {
            // Checkpoint (c): before each attempt.
            if ctx.controller.is_cancelled() {
                failure = Some(ctx.cancel_error());
                break;
            }
            attempt += 1;

            let outcome = with_start_phase(ctx.start_timeout, async {
                let raw = starter().await?;
                let mut started = raw.into_result()?;
                let first = started.stream.next().await;
                match first {
                    Some(Err(err)) => Err(err.at_stage(Stage::Start)),
                    Some(Ok(chunk)) => Ok((started, Some(chunk))),
                    None => Ok((started, None)),
                }
            })
            .await;

            match outcome {
                Ok((started, first)) => {
                    state.request_id = started.request_id;
                    state.response_id = started.response_id;
                    drained_at_start = first.is_none();
                    first_chunk = first;
                    native = Some(started.stream);
                    break;
                }
                Err(err) => {
                    let err = err
                        .with_provider(ctx.provider.clone())
                        .with_operation("stream");
                    if attempt >= ctx.retry.max_attempts
                        || !ctx.retry.allows(err.code, Stage::Start)
                    {
                        failure = Some(err);
                        break;
                    }

                    let backoff_ms = ctx.retry.sample_backoff_ms(attempt - 1);
                    let delay_ms = err
                        .retry_after_ms
                        .map_or(backoff_ms, |ra| backoff_ms.max(ra));
                    warn!(
                        provider = %ctx.provider,
                        model = %ctx.model,
                        operation = "stream",
                        stage = "retry",
                        attempt,
                        backoff_ms = delay_ms,
                        error_code = %err.code,
                        "retrying start phase"
                    );

                    tokio::select! {
                        () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                        () = ctx.controller.token().cancelled() => {
                            failure = Some(ctx.cancel_error());
                            break;
                        }
                    }
                }
            }
        }

        // ── Streaming phase: translate until drain, error, or cancel ──
        if failure.is_none() && !drained_at_start {
            // `native` is always present when no failure was recorded.
            if let Some(mut stream) = native.take() {
                let mut upcoming = first_chunk.take();
                loop {
                    // Checkpoint (a): before each chunk is translated.
                    if ctx.controller.is_cancelled() {
                        failure = Some(ctx.cancel_error());
                        break;
                    }

                    let item = match upcoming.take() {
                        Some(chunk) => Some(Ok(chunk)),
                        None => stream.next().await,
                    };

                    match item {
                        Some(Ok(chunk)) => match translator(chunk) {
                            Ok(translation) => {
                                if let Some(usage) = translation.usage {
                                    merge_usage(&mut state.tokens, usage);
                                }
                                if let Some(id) = translation.response_id {
                                    let _ = state.response_id.get_or_insert(id);
                                }
                                if let Some(text) = translation.delta {
                                    if state.emitted_count == 0 {
                                        state.t_first = Some(Instant::now());
                                    }
                                    let index = state.emitted_count;
                                    state.emitted_count += 1;
                                    debug!(
                                        event = "stream.adapter.delta",
                                        provider = %ctx.provider,
                                        model = %ctx.model,
                                        index,
                                        chars = text.len(),
                                        "delta"
                                    );
                                    yield ChatStreamEvent::delta(text, index);
                                }
                            }
                            Err(err) => {
                                // Translator contract: failures are
                                // suppressed and the chunk is skipped.
                                debug!(
                                    provider = %ctx.provider,
                                    error = %err,
                                    "translator failed; chunk skipped"
                                );
                            }
                        },
                        Some(Err(err)) => {
                            failure = Some(
                                err.at_stage(Stage::MidStream)
                                    .with_provider(ctx.provider.clone())
                                    .with_operation("stream"),
                            );
                            break;
                        }
                        None => {
                            // Checkpoint (b): after successful drain.
                            if ctx.controller.is_cancelled() {
                                failure = Some(ctx.cancel_error());
                            }
                            break;
                        }
                    }
                }
            }
        }

        // ── Finalize: exactly once, terminal strictly after all deltas ──
        yield finalize(&ctx, t_start, &state, failure);
    })
}

/// Build a stream that finalizes immediately with `error`, without any
/// starter involved. Used for capability gating, where the adapter
/// short-circuits before a starter even exists.
pub fn fail_stream(ctx: StreamContext, error: ProviderError) -> ChatStream {
    Box::pin(async_stream::stream! {
        let t_start = Instant::now();
        let state = StreamState::default();
        yield finalize(&ctx, t_start, &state, Some(error));
    })
}

fn merge_usage(into: &mut TokenUsage, from: TokenUsage) {
    if from.prompt.is_some() {
        into.prompt = from.prompt;
    }
    if from.completion.is_some() {
        into.completion = from.completion;
    }
    if from.total.is_some() {
        into.total = from.total;
    } else if into.prompt.is_some() || into.completion.is_some() {
        into.total = Some(into.prompt.unwrap_or(0) + into.completion.unwrap_or(0));
    }
}

#[allow(clippy::cast_possible_truncation)] // u128→u64 ms truncation is out of reach
fn finalize(
    ctx: &StreamContext,
    t_start: Instant,
    state: &StreamState,
    failure: Option<ProviderError>,
) -> ChatStreamEvent {
    let mut total_duration_ms = t_start.elapsed().as_millis() as u64;
    let time_to_first_token_ms = state.t_first.map(|t_first| {
        // Sub-millisecond first tokens still count as emitted.
        let ttft = ((t_first - t_start).as_millis() as u64).max(1);
        total_duration_ms = total_duration_ms.max(ttft);
        ttft
    });

    let metrics = StreamMetrics {
        emitted_count: state.emitted_count,
        emitted: state.emitted_count > 0,
        time_to_first_token_ms,
        total_duration_ms,
        tokens: state.tokens,
        error_code: failure.as_ref().map(|e| e.code),
    };
    let error_string = failure.as_ref().map(ProviderError::terminal_string);

    match &error_string {
        None => info!(
            event = "stream.adapter.end",
            provider = %ctx.provider,
            model = %ctx.model,
            phase = "finalize",
            error_code = Option::<&str>::None,
            emitted = metrics.emitted,
            emitted_count = metrics.emitted_count,
            time_to_first_token_ms = metrics.time_to_first_token_ms,
            total_duration_ms = metrics.total_duration_ms,
            request_id = state.request_id.as_deref(),
            response_id = state.response_id.as_deref(),
            correlation_id = ctx.correlation_id.as_deref(),
            "stream finalized"
        ),
        Some(err_string) => error!(
            event = "stream.adapter.error",
            provider = %ctx.provider,
            model = %ctx.model,
            phase = "finalize",
            error_code = metrics.error_code.map(|c| c.as_str()),
            emitted = metrics.emitted,
            emitted_count = metrics.emitted_count,
            time_to_first_token_ms = metrics.time_to_first_token_ms,
            total_duration_ms = metrics.total_duration_ms,
            request_id = state.request_id.as_deref(),
            response_id = state.response_id.as_deref(),
            correlation_id = ctx.correlation_id.as_deref(),
            error = %err_string,
            "stream finalized with error"
        ),
    }

    if let Some(repo) = &ctx.metrics_repo {
        let record = MetricsRecord::from_stream_metrics(
            ctx.provider.clone(),
            ctx.model.clone(),
            &metrics,
            ctx.correlation_id.clone(),
        );
        if let Err(err) = repo.append(record) {
            warn!(provider = %ctx.provider, error = %err, "failed to persist stream metrics");
        }
    }

    if let Some(exporter) = &ctx.exporter {
        let record = MetricsRecord::from_stream_metrics(
            ctx.provider.clone(),
            ctx.model.clone(),
            &metrics,
            ctx.correlation_id.clone(),
        );
        if let Err(err) = exporter.emit(&record) {
            error!(
                event = "metrics.export.error",
                provider = %ctx.provider,
                error = %err,
                "metrics exporter failed"
            );
        }
    }

    ChatStreamEvent::Terminal {
        finish: true,
        error: error_string,
        metrics,
        request_id: state.request_id.clone(),
        response_id: state.response_id.clone(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
