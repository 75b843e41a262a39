//! End-to-end lifecycle scenarios over the mock provider, the streaming
//! adapter, and the SQLite store.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use prism_core::error::{ErrorCode, ProviderError};
use prism_core::message::{ChatRequest, Message};
use prism_core::model::ModelInfo;
use prism_core::ports::ModelRegistryRepository;
use prism_core::response::TokenUsage;
use prism_core::retry::RetryPolicy;
use prism_core::stream::ChatStreamEvent;
use prism_core::time::now_stored;

use prism_llm::registry::{ModelFetcher, ModelRegistry};
use prism_llm::streaming::{RawStarter, StreamContext, Translation, run_stream};
use prism_llm::{CreateOptions, HttpClientPool, Provider, ProviderFactory, ProviderServices};
use prism_store::SqliteStore;

fn services_for(store: &SqliteStore) -> ProviderServices {
    ProviderServices {
        chat_logs: Some(Arc::new(store.chat_logs())),
        prefs: Some(Arc::new(store.prefs())),
        observed: Some(Arc::new(store.observed())),
        metrics_repo: Some(Arc::new(store.metrics())),
        exporter: None,
        retry: RetryPolicy::default(),
        start_timeout: Duration::from_secs(30),
    }
}

fn mock_request() -> ChatRequest {
    ChatRequest::new("mock-small", vec![Message::user("hi")])
}

fn quick_ctx() -> StreamContext {
    let mut ctx = StreamContext::new("mock", "mock-small");
    ctx.start_timeout = Duration::from_millis(1000);
    ctx.retry = RetryPolicy {
        max_attempts: 1,
        base_delay_ms: 1,
        max_delay_ms: 5,
    };
    ctx
}

// ── Scenario A: happy path non-stream under USE_MOCKS ───────────────────

#[tokio::test]
async fn scenario_a_mock_chat_happy_path() {
    prism_settings::set_in_process_var("USE_MOCKS", "1");

    let store = SqliteStore::open_in_memory().unwrap();
    let factory = ProviderFactory::new(
        Arc::new(HttpClientPool::new()),
        services_for(&store),
        Some(Arc::new(store.key_vault())),
    );

    let provider = factory.create("mock", &CreateOptions::default()).unwrap();
    let response = provider.chat(&mock_request()).await.unwrap();

    assert_eq!(response.text, "hello");
    assert_eq!(response.metadata.tokens, TokenUsage::unknown());
    let tokens_json = serde_json::to_value(&response.metadata.tokens).unwrap();
    assert!(tokens_json["prompt"].is_null());
    assert!(tokens_json["completion"].is_null());
    assert!(tokens_json["total"].is_null());

    // Exactly one chat log row was appended.
    assert_eq!(store.chat_logs().count(Some("mock")).unwrap(), 1);

    prism_settings::remove_in_process_var("USE_MOCKS");
}

// ── Scenario B: streaming happy path ────────────────────────────────────

#[tokio::test]
async fn scenario_b_streaming_happy_path() {
    let store = SqliteStore::open_in_memory().unwrap();
    let provider =
        prism_llm::providers::MockProvider::new(services_for(&store));

    let handle = provider.stream(&mock_request());
    let events: Vec<_> = handle.events.collect().await;

    let deltas: Vec<_> = events
        .iter()
        .filter_map(ChatStreamEvent::delta_text)
        .collect();
    assert_eq!(deltas, ["Hel", "lo"]);

    let terminals: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1);
    match terminals[0] {
        ChatStreamEvent::Terminal { error, metrics, .. } => {
            assert!(error.is_none());
            assert_eq!(metrics.emitted_count, 2);
            assert!(metrics.emitted);
            let ttft = metrics.time_to_first_token_ms.unwrap();
            assert!(ttft > 0);
            assert!(metrics.total_duration_ms >= ttft);
            assert_eq!(metrics.error_code, None);
        }
        ChatStreamEvent::Delta { .. } => unreachable!(),
    }

    // Exactly one metrics record for the invocation.
    assert_eq!(store.metrics().count("mock").unwrap(), 1);
}

// ── Scenario C: start-phase timeout ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn scenario_c_start_phase_timeout() {
    let events: Vec<_> = run_stream(
        quick_ctx(),
        || async {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(RawStarter::Stream(Box::pin(futures::stream::empty())))
        },
        |chunk: String| Ok(Translation::delta(chunk)),
    )
    .collect()
    .await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        ChatStreamEvent::Terminal { error, metrics, .. } => {
            assert_eq!(metrics.emitted_count, 0);
            assert_eq!(metrics.time_to_first_token_ms, None);
            assert!(metrics.total_duration_ms >= 1000);
            assert!(metrics.total_duration_ms < 1100);
            assert_eq!(metrics.error_code, Some(ErrorCode::Timeout));
            assert!(error.as_deref().unwrap().starts_with("timeout:"));
        }
        ChatStreamEvent::Delta { .. } => panic!("expected terminal"),
    }
}

// ── Scenario D: cooperative cancellation ────────────────────────────────

#[tokio::test]
async fn scenario_d_cooperative_cancellation() {
    let ctx = quick_ctx();
    let controller = ctx.controller.clone();

    let stream = run_stream(
        ctx,
        || async {
            let endless = futures::stream::unfold(0u64, |n| async move {
                Some((Ok::<_, ProviderError>(format!("delta-{n}")), n + 1))
            });
            Ok(RawStarter::Stream(Box::pin(endless)))
        },
        |chunk: String| Ok(Translation::delta(chunk)),
    );
    let mut stream = std::pin::pin!(stream);

    let mut deltas = 0u64;
    let mut saw_terminal = false;
    while let Some(event) = stream.next().await {
        match event {
            ChatStreamEvent::Delta { .. } => {
                deltas += 1;
                if deltas == 3 {
                    controller.cancel("user");
                }
            }
            ChatStreamEvent::Terminal { error, metrics, .. } => {
                assert!(metrics.emitted_count >= 3);
                assert_eq!(metrics.error_code, Some(ErrorCode::Cancelled));
                assert!(error.as_deref().unwrap().starts_with("cancelled:user"));
                saw_terminal = true;
            }
        }
    }
    assert!(saw_terminal);
    // Cancellation lands within one chunk of delay.
    assert!(deltas <= 4, "saw {deltas} deltas after cancel");
}

// ── Scenario E: internal contract violation ─────────────────────────────

#[tokio::test]
async fn scenario_e_internal_contract_violation() {
    let events: Vec<_> = run_stream(
        quick_ctx(),
        || async {
            Ok(RawStarter::Mapping {
                stream: Option::<prism_llm::streaming::NativeStream<String>>::None,
                request_id: None,
                response_id: None,
            })
        },
        |chunk: String| Ok(Translation::delta(chunk)),
    )
    .collect()
    .await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        ChatStreamEvent::Terminal { error, metrics, .. } => {
            assert_eq!(metrics.emitted_count, 0);
            assert_eq!(metrics.error_code, Some(ErrorCode::Internal));
            assert!(error.as_deref().unwrap().starts_with("internal:"));
        }
        ChatStreamEvent::Delta { .. } => panic!("expected terminal"),
    }
}

// ── Scenario F: live-fetch fallback to persisted snapshot ───────────────

struct FailingFetcher;

#[async_trait::async_trait]
impl ModelFetcher for FailingFetcher {
    async fn fetch(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Err(ProviderError::new(ErrorCode::Transient, "connection refused")
            .with_provider("openai")
            .with_operation("list_models"))
    }
}

#[tokio::test]
async fn scenario_f_live_fetch_fallback() {
    let store = SqliteStore::open_in_memory().unwrap();
    let repo = Arc::new(store.registry());

    let cached = prism_core::model::ModelRegistrySnapshot::new(
        "openai",
        vec![ModelInfo::new("gpt-4o"), ModelInfo::new("gpt-4o-mini")],
        now_stored(),
    );
    repo.save_snapshot(&cached).unwrap();

    let registry = ModelRegistry::new(repo, Some(Arc::new(store.observed())))
        .with_fetcher("openai", Arc::new(FailingFetcher));

    let snapshot = registry.list("openai", true).await.unwrap();
    let ids: Vec<_> = snapshot.models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["gpt-4o", "gpt-4o-mini"]);
}

// ── Cross-cutting invariants ────────────────────────────────────────────

#[tokio::test]
async fn terminal_is_always_last_and_unique() {
    for chunk_count in [0usize, 1, 5, 32] {
        let chunks: Vec<String> = (0..chunk_count).map(|i| format!("c{i}")).collect();
        let events: Vec<_> = run_stream(
            quick_ctx(),
            move || {
                let chunks = chunks.clone();
                async move {
                    Ok(RawStarter::Stream(Box::pin(futures::stream::iter(
                        chunks.into_iter().map(Ok::<_, ProviderError>),
                    ))))
                }
            },
            |chunk: String| Ok(Translation::delta(chunk)),
        )
        .collect()
        .await;

        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
        assert_eq!(events.len(), chunk_count + 1);
    }
}

#[tokio::test]
async fn metrics_invariants_hold_across_outcomes() {
    // Success, empty, and failure terminals all satisfy the metric laws.
    let outcomes: Vec<Vec<ChatStreamEvent>> = vec![
        run_stream(
            quick_ctx(),
            || async {
                Ok(RawStarter::Stream(Box::pin(futures::stream::iter(vec![
                    Ok::<_, ProviderError>("a".to_owned()),
                ]))))
            },
            |chunk: String| Ok(Translation::delta(chunk)),
        )
        .collect()
        .await,
        run_stream(
            quick_ctx(),
            || async { Ok(RawStarter::Stream(Box::pin(futures::stream::empty()))) },
            |chunk: String| Ok(Translation::delta(chunk)),
        )
        .collect()
        .await,
        run_stream(
            quick_ctx(),
            || async {
                Err::<RawStarter<String>, _>(ProviderError::new(ErrorCode::Auth, "no"))
            },
            |chunk: String| Ok(Translation::delta(chunk)),
        )
        .collect()
        .await,
    ];

    for events in outcomes {
        match events.last().unwrap() {
            ChatStreamEvent::Terminal { error, metrics, .. } => {
                assert!(metrics.invariants_hold());
                match &metrics.error_code {
                    None => assert!(error.is_none()),
                    Some(code) => {
                        assert!(error.as_deref().unwrap().starts_with(code.as_str()));
                    }
                }
            }
            ChatStreamEvent::Delta { .. } => panic!("expected terminal"),
        }
    }
}
