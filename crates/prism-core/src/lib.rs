//! # prism-core
//!
//! Foundation types for the Prism provider-agnostic LLM core.
//!
//! Everything the adapter crates agree on lives here:
//! - Request/response/message DTOs and the normalized stream event shape
//! - The closed [`ErrorCode`](error::ErrorCode) taxonomy and deterministic
//!   classification helpers
//! - Retry policy math (exponential backoff, full jitter, `Retry-After`)
//! - Persistence ports implemented by `prism-store`
//! - The UTC timestamp normalization policy shared by every repository
//!
//! This crate is transport-free: no HTTP, no database, no async runtime
//! beyond the cancellation token re-export.

#![deny(unsafe_code)]

pub mod cancel;
pub mod error;
pub mod message;
pub mod model;
pub mod ports;
pub mod records;
pub mod response;
pub mod retry;
pub mod stream;
pub mod text;
pub mod time;

pub use cancel::StreamController;
pub use error::{ErrorCode, ProviderError, Stage};
pub use message::{ChatRequest, InvalidRequest, Message, ResponseFormat, Role, ToolSpec};
pub use model::{Capability, ModelInfo, ModelRegistrySnapshot, ObservedCapability, Provenance};
pub use records::{ChatLog, MetricsRecord};
pub use response::{ChatResponse, FinishReason, ProviderMetadata, TokenUsage};
pub use retry::RetryPolicy;
pub use stream::{ChatStreamEvent, StreamMetrics};
