//! Persistence ports.
//!
//! The core talks to storage only through these traits; `prism-store`
//! provides the reference SQLite adapter. All methods are synchronous;
//! the reference adapter is an embedded database and callers treat writes
//! as short critical sections.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::{Capability, ModelRegistrySnapshot, ObservedCapability};
use crate::records::{ChatLog, MetricsRecord};

/// Opaque storage failure surfaced through a port.
#[derive(Debug, thiserror::Error)]
#[error("storage error: {message}")]
pub struct StorageError {
    /// What went wrong.
    pub message: String,
    /// Underlying cause, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// Build from a message alone.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Build from a cause.
    pub fn from_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }
}

/// Result alias for port operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Observed capability flags per model: `model_id → feature → value`.
pub type ObservedMap = BTreeMap<String, BTreeMap<Capability, bool>>;

/// Snapshot persistence for the model registry.
pub trait ModelRegistryRepository: Send + Sync {
    /// Atomically replace the provider's snapshot.
    fn save_snapshot(&self, snapshot: &ModelRegistrySnapshot) -> StorageResult<()>;

    /// Load the latest snapshot, or `None` if the provider has none.
    fn load_snapshot(&self, provider: &str) -> StorageResult<Option<ModelRegistrySnapshot>>;
}

/// Evidence-backed capability observations.
pub trait ObservedCapabilityStore: Send + Sync {
    /// Upsert one observation; the latest timestamp wins.
    fn record(&self, observation: &ObservedCapability) -> StorageResult<()>;

    /// Load all observations for a provider.
    fn load(&self, provider: &str) -> StorageResult<ObservedMap>;
}

/// Append-only chat log.
pub trait ChatLogRepository: Send + Sync {
    /// Persist a log entry, assigning its ID and `created_at`.
    fn append(&self, log: ChatLog) -> StorageResult<ChatLog>;
}

/// Append-only stream metrics.
pub trait MetricsRepository: Send + Sync {
    /// Persist a metrics record, assigning its ID and `created_at`.
    fn append(&self, record: MetricsRecord) -> StorageResult<MetricsRecord>;
}

/// Typed key-value preferences.
pub trait PrefsRepository: Send + Sync {
    /// Read a preference value.
    fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Write a preference value.
    fn set(&self, key: &str, value: &Value) -> StorageResult<()>;

    /// Read a boolean preference with a default.
    fn get_bool(&self, key: &str, default: bool) -> StorageResult<bool> {
        Ok(self
            .get(key)?
            .and_then(|v| v.as_bool())
            .unwrap_or(default))
    }
}

/// Opaque provider API key vault.
///
/// The reference implementation stores opaque bytes; encryption at rest is
/// a policy concern an implementation may add transparently.
pub trait KeyVaultRepository: Send + Sync {
    /// Read the stored key for a provider.
    fn get_key(&self, provider: &str) -> StorageResult<Option<String>>;

    /// Store a key for a provider.
    fn set_key(&self, provider: &str, value: &str) -> StorageResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct MapPrefs(std::sync::Mutex<BTreeMap<String, Value>>);

    impl PrefsRepository for MapPrefs {
        fn get(&self, key: &str) -> StorageResult<Option<Value>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
            let _ = self.0.lock().unwrap().insert(key.to_owned(), value.clone());
            Ok(())
        }
    }

    #[test]
    fn get_bool_default_and_override() {
        let prefs = MapPrefs(std::sync::Mutex::new(BTreeMap::new()));
        assert!(prefs.get_bool("chat_logging.enabled", true).unwrap());
        prefs
            .set("chat_logging.enabled", &Value::Bool(false))
            .unwrap();
        assert!(!prefs.get_bool("chat_logging.enabled", true).unwrap());
    }

    #[test]
    fn get_bool_ignores_non_bool_values() {
        let prefs = MapPrefs(std::sync::Mutex::new(BTreeMap::new()));
        prefs.set("flag", &Value::String("yes".into())).unwrap();
        assert!(prefs.get_bool("flag", true).unwrap());
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::message("disk full");
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
