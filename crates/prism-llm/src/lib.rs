//! # prism-llm
//!
//! Provider adapters and the streaming lifecycle for the Prism core.
//!
//! The centerpiece is the streaming adapter in [`streaming`]: every
//! provider's `stream` implementation is a pair of callbacks (a starter
//! and a translator) composed with one shared lifecycle machine that owns
//! timeouts, retries, cancellation, terminal metrics, and finalize
//! bookkeeping. Adapters never write their own streaming loops.
//!
//! Around it: the provider trait and factory, the shared HTTP client
//! pool, the SSE / JSON-lines parsers, the model registry with live-fetch
//! → cached-snapshot fallback, observed-capability recording, and the
//! metrics exporter port.

#![deny(unsafe_code)]

pub mod chatlog;
pub mod factory;
pub mod fetchers;
pub mod http_pool;
pub mod metrics;
pub mod observed;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse;
pub mod streaming;

pub use factory::{CreateOptions, ProviderFactory, ProviderServices};
pub use http_pool::HttpClientPool;
pub use metrics::{ExportError, MetricsExporter, NoopExporter};
pub use observed::ObservationRecorder;
pub use provider::{ChatStream, Provider, ProviderResult, StreamHandle, classify_reqwest};
pub use registry::{ModelFetcher, ModelRegistry};
pub use streaming::{RawStarter, StarterResult, StreamContext, Translation, run_stream};
