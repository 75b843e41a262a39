//! Starter shapes and their normalization.
//!
//! A starter hands the streaming adapter a native stream plus optional
//! request/response identifiers. Providers historically returned one of
//! three shapes (bare stream, stream + meta pair, or a mapping); all of
//! them normalize into the single tagged [`StarterResult`] here, at the
//! adapter boundary, so the lifecycle machine only ever sees one type.
//! A mapping without a stream is an `internal` contract violation.

use std::pin::Pin;

use futures::Stream;

use prism_core::error::ProviderError;

/// Boxed native chunk stream. Items are provider-native chunks or
/// classified transport errors.
pub type NativeStream<C> = Pin<Box<dyn Stream<Item = Result<C, ProviderError>> + Send>>;

/// Identifiers a starter may surface alongside its stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamMeta {
    /// Provider request ID (usually from response headers).
    pub request_id: Option<String>,
    /// Provider response ID (usually from the first native chunk).
    pub response_id: Option<String>,
}

/// The single normalized starter result.
pub struct StarterResult<C> {
    /// The native chunk stream.
    pub stream: NativeStream<C>,
    /// Provider request ID, if known at start.
    pub request_id: Option<String>,
    /// Provider response ID, if known at start.
    pub response_id: Option<String>,
}

impl<C> StarterResult<C> {
    /// Wrap a bare stream with no metadata.
    pub fn from_stream(stream: NativeStream<C>) -> Self {
        Self {
            stream,
            request_id: None,
            response_id: None,
        }
    }
}

/// The legacy starter shapes accepted at the adapter boundary.
pub enum RawStarter<C> {
    /// Shape 1: a bare iterable of native chunks.
    Stream(NativeStream<C>),
    /// Shape 2: a (iterable, meta) pair.
    WithMeta(NativeStream<C>, StreamMeta),
    /// Shape 3: a mapping with a required `stream` key and optional IDs.
    /// `stream: None` models a mapping that lacks the key.
    Mapping {
        /// The required stream entry.
        stream: Option<NativeStream<C>>,
        /// Optional request ID entry.
        request_id: Option<String>,
        /// Optional response ID entry.
        response_id: Option<String>,
    },
}

impl<C> RawStarter<C> {
    /// Normalize into a [`StarterResult`].
    ///
    /// A mapping missing its `stream` key is surfaced as an `internal`
    /// contract violation.
    pub fn into_result(self) -> Result<StarterResult<C>, ProviderError> {
        match self {
            Self::Stream(stream) => Ok(StarterResult::from_stream(stream)),
            Self::WithMeta(stream, meta) => Ok(StarterResult {
                stream,
                request_id: meta.request_id,
                response_id: meta.response_id,
            }),
            Self::Mapping {
                stream: Some(stream),
                request_id,
                response_id,
            } => Ok(StarterResult {
                stream,
                request_id,
                response_id,
            }),
            Self::Mapping { stream: None, .. } => Err(ProviderError::internal(
                "starter() mapping missing 'stream' key",
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::error::ErrorCode;

    fn chunks(items: Vec<&'static str>) -> NativeStream<&'static str> {
        Box::pin(futures::stream::iter(items.into_iter().map(Ok)))
    }

    #[test]
    fn bare_stream_normalizes_without_ids() {
        let result = RawStarter::Stream(chunks(vec!["a"])).into_result().unwrap();
        assert_eq!(result.request_id, None);
        assert_eq!(result.response_id, None);
    }

    #[test]
    fn pair_normalizes_with_meta() {
        let raw = RawStarter::WithMeta(
            chunks(vec!["a"]),
            StreamMeta {
                request_id: Some("req_abc".into()),
                response_id: Some("resp_def".into()),
            },
        );
        let result = raw.into_result().unwrap();
        assert_eq!(result.request_id.as_deref(), Some("req_abc"));
        assert_eq!(result.response_id.as_deref(), Some("resp_def"));
    }

    #[test]
    fn mapping_with_stream_normalizes() {
        let raw = RawStarter::Mapping {
            stream: Some(chunks(vec!["a"])),
            request_id: Some("req_1".into()),
            response_id: None,
        };
        let result = raw.into_result().unwrap();
        assert_eq!(result.request_id.as_deref(), Some("req_1"));
    }

    #[test]
    fn mapping_without_stream_is_internal_violation() {
        let raw: RawStarter<&'static str> = RawStarter::Mapping {
            stream: None,
            request_id: Some("req_1".into()),
            response_id: None,
        };
        let err = raw.into_result().err().unwrap();
        assert_eq!(err.code, ErrorCode::Internal);
        assert!(!err.retryable);
        assert_eq!(
            err.terminal_string(),
            "internal:starter() mapping missing 'stream' key"
        );
    }
}
