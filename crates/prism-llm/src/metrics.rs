//! Metrics exporter port.
//!
//! Terminal stream metrics are emitted exactly once per invocation,
//! fire-and-forget. Exporters must not raise; the streaming adapter wraps
//! emission in catch-and-log regardless, so a misbehaving exporter can
//! never fail a stream. Concrete exporters (Prometheus, OTLP, ...) live
//! outside the core; only the port and the no-op default are defined
//! here.

use prism_core::records::MetricsRecord;

/// Failure reported by an exporter. Always swallowed and logged by the
/// caller, never re-raised.
#[derive(Debug, thiserror::Error)]
#[error("metrics export failed: {message}")]
pub struct ExportError {
    /// What went wrong.
    pub message: String,
}

impl ExportError {
    /// Build from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Single-shot terminal metrics emission.
pub trait MetricsExporter: Send + Sync {
    /// Emit one terminal metrics payload.
    fn emit(&self, payload: &MetricsRecord) -> Result<(), ExportError>;
}

/// The default exporter: does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopExporter;

impl MetricsExporter for NoopExporter {
    fn emit(&self, _payload: &MetricsRecord) -> Result<(), ExportError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::stream::StreamMetrics;

    #[test]
    fn noop_exporter_accepts_everything() {
        let record = MetricsRecord::from_stream_metrics(
            "mock",
            "mock-small",
            &StreamMetrics::default(),
            None,
        );
        assert!(NoopExporter.emit(&record).is_ok());
    }

    #[test]
    fn export_error_display() {
        let err = ExportError::new("collector unreachable");
        assert_eq!(err.to_string(), "metrics export failed: collector unreachable");
    }

    #[test]
    fn exporter_is_object_safe() {
        fn assert_object_safe(_: &dyn MetricsExporter) {}
        let _ = assert_object_safe;
    }
}
