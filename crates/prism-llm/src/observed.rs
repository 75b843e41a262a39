//! Observed-capability recording.
//!
//! Capabilities are learned from data, never from model names. A `true`
//! is recorded only when a successful invocation demonstrated the
//! feature; a `false` only when the provider explicitly rejected it.
//! Anything else stays unrecorded. One recorder lives per adapter
//! invocation, so each (model, feature) is written at most once per
//! invocation; store failures degrade to a warning.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::warn;

use prism_core::model::{Capability, ObservedCapability};
use prism_core::ports::ObservedCapabilityStore;
use prism_core::time::now_stored;

/// Per-invocation capability observation recorder.
pub struct ObservationRecorder {
    store: Option<Arc<dyn ObservedCapabilityStore>>,
    provider: String,
    seen: Mutex<HashSet<(String, Capability)>>,
}

impl ObservationRecorder {
    /// New recorder for one invocation against `provider`.
    pub fn new(store: Option<Arc<dyn ObservedCapabilityStore>>, provider: impl Into<String>) -> Self {
        Self {
            store,
            provider: provider.into(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Record that a successful invocation demonstrated `feature`.
    pub fn record_success(&self, model: &str, feature: Capability) {
        self.record(model, feature, true);
    }

    /// Record that the provider explicitly rejected `feature`.
    pub fn record_rejection(&self, model: &str, feature: Capability) {
        self.record(model, feature, false);
    }

    fn record(&self, model: &str, feature: Capability, value: bool) {
        let Some(store) = &self.store else {
            return;
        };

        // At most one write per (model, feature) per invocation.
        {
            let Ok(mut seen) = self.seen.lock() else {
                return;
            };
            if !seen.insert((model.to_owned(), feature)) {
                return;
            }
        }

        let observation = ObservedCapability {
            provider: self.provider.clone(),
            model_id: model.to_owned(),
            feature,
            value,
            observed_at: now_stored(),
        };
        if let Err(err) = store.record(&observation) {
            warn!(
                provider = %self.provider,
                model,
                feature = %feature,
                error = %err,
                "failed to persist capability observation"
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
