//! Model registry: live fetch → cached snapshot fallback → observed merge.
//!
//! `list` never fails because a provider is unreachable: a failed live
//! fetch is logged exactly once with `fallback_used=true` and the latest
//! persisted snapshot is returned instead (empty if none was ever
//! persisted). Observed capability flags are overlaid onto snapshot
//! models at read time; observed evidence overrides provider metadata in
//! both directions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use prism_core::error::ProviderError;
use prism_core::model::{ModelInfo, ModelRegistrySnapshot};
use prism_core::ports::{ModelRegistryRepository, ObservedCapabilityStore};
use prism_core::time::now_stored;

use crate::provider::ProviderResult;

/// Per-provider model listing function.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Fetch the provider's current model list.
    async fn fetch(&self) -> ProviderResult<Vec<ModelInfo>>;
}

/// The model registry.
pub struct ModelRegistry {
    repo: Arc<dyn ModelRegistryRepository>,
    observed: Option<Arc<dyn ObservedCapabilityStore>>,
    fetchers: HashMap<String, Arc<dyn ModelFetcher>>,
}

impl ModelRegistry {
    /// Registry over a snapshot repository, optionally overlaying
    /// observed capabilities.
    pub fn new(
        repo: Arc<dyn ModelRegistryRepository>,
        observed: Option<Arc<dyn ObservedCapabilityStore>>,
    ) -> Self {
        Self {
            repo,
            observed,
            fetchers: HashMap::new(),
        }
    }

    /// Register the fetcher for a provider.
    #[must_use]
    pub fn with_fetcher(mut self, provider: impl Into<String>, fetcher: Arc<dyn ModelFetcher>) -> Self {
        let _ = self.fetchers.insert(provider.into(), fetcher);
        self
    }

    /// List models for `provider`.
    ///
    /// With `refresh`, the registered fetcher runs first; on success the
    /// result is persisted as a new snapshot (atomic replace), on failure
    /// the cause is logged once and the prior snapshot survives. The
    /// latest persisted snapshot is then loaded, observed capabilities
    /// are overlaid, and the result returned. An absent snapshot yields
    /// an empty one, not an error.
    pub async fn list(&self, provider: &str, refresh: bool) -> ProviderResult<ModelRegistrySnapshot> {
        if refresh {
            self.refresh(provider).await;
        }

        let mut snapshot = match self.repo.load_snapshot(provider) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => ModelRegistrySnapshot::empty(provider, now_stored()),
            Err(err) => {
                return Err(ProviderError::internal(format!(
                    "failed to load registry snapshot: {err}"
                ))
                .with_provider(provider)
                .with_operation("list_models"));
            }
        };

        self.overlay_observed(provider, &mut snapshot);
        Ok(snapshot)
    }

    async fn refresh(&self, provider: &str) {
        let Some(fetcher) = self.fetchers.get(provider) else {
            debug!(provider, "no fetcher registered; serving cached snapshot");
            return;
        };

        match fetcher.fetch().await {
            Ok(models) => {
                let snapshot = ModelRegistrySnapshot::new(provider, models, now_stored());
                if let Err(err) = self.repo.save_snapshot(&snapshot) {
                    warn!(provider, error = %err, "failed to persist refreshed snapshot");
                }
            }
            Err(err) => {
                // Logged exactly once; the prior snapshot is never deleted.
                warn!(
                    provider,
                    operation = "list_models",
                    failure_class = %err.code,
                    fallback_used = true,
                    error = %err,
                    "live model fetch failed; serving cached snapshot"
                );
            }
        }
    }

    fn overlay_observed(&self, provider: &str, snapshot: &mut ModelRegistrySnapshot) {
        let Some(observed) = &self.observed else {
            return;
        };
        let map = match observed.load(provider) {
            Ok(map) => map,
            Err(err) => {
                warn!(provider, error = %err, "failed to load observed capabilities");
                return;
            }
        };
        if map.is_empty() {
            return;
        }

        for model in &mut snapshot.models {
            let Some(flags) = map.get(&model.id) else {
                continue;
            };
            for (feature, value) in flags {
                if *value {
                    let _ = model.capabilities.insert(*feature);
                } else {
                    let _ = model.capabilities.remove(feature);
                }
            }
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
    use prism_core::model::Capability;
    use prism_core::ports::{ObservedMap, StorageResult};
    use std::sync::Mutex;

    struct MemoryRepo(Mutex<HashMap<String, ModelRegistrySnapshot>>);

    impl MemoryRepo {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(HashMap::new())))
        }
    }

    impl ModelRegistryRepository for MemoryRepo {
        fn save_snapshot(&self, snapshot: &ModelRegistrySnapshot) -> StorageResult<()> {
            let _ = self
                .0
                .lock()
                .unwrap()
                .insert(snapshot.provider.clone(), snapshot.clone());
            Ok(())
        }

        fn load_snapshot(&self, provider: &str) -> StorageResult<Option<ModelRegistrySnapshot>> {
            Ok(self.0.lock().unwrap().get(provider).cloned())
        }
    }

    struct FixedObserved(ObservedMap);

    impl ObservedCapabilityStore for FixedObserved {
        fn record(&self, _observation: &prism_core::model::ObservedCapability) -> StorageResult<()> {
            Ok(())
        }

        fn load(&self, _provider: &str) -> StorageResult<ObservedMap> {
            Ok(self.0.clone())
        }
    }

    struct OkFetcher(Vec<&'static str>);

    #[async_trait]
    impl ModelFetcher for OkFetcher {
        async fn fetch(&self) -> ProviderResult<Vec<ModelInfo>> {
            Ok(self.0.iter().map(|id| ModelInfo::new(*id)).collect())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ModelFetcher for FailingFetcher {
        async fn fetch(&self) -> ProviderResult<Vec<ModelInfo>> {
            Err(ProviderError::new(ErrorCode::Transient, "connection refused")
                .with_provider("openai")
                .with_operation("list_models"))
        }
    }

    #[tokio::test]
    async fn refresh_persists_fetched_snapshot() {
        let repo = MemoryRepo::new();
        let registry = ModelRegistry::new(repo.clone(), None)
            .with_fetcher("openai", Arc::new(OkFetcher(vec!["gpt-4o", "gpt-4o-mini"])));

        let snapshot = registry.list("openai", true).await.unwrap();
        assert_eq!(snapshot.models.len(), 2);
        assert!(repo.0.lock().unwrap().contains_key("openai"));
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_cached_snapshot() {
        let repo = MemoryRepo::new();
        let cached = ModelRegistrySnapshot::new(
            "openai",
            vec![ModelInfo::new("cached-a"), ModelInfo::new("cached-b")],
            now_stored(),
        );
        repo.save_snapshot(&cached).unwrap();

        let registry =
            ModelRegistry::new(repo, None).with_fetcher("openai", Arc::new(FailingFetcher));

        let snapshot = registry.list("openai", true).await.unwrap();
        let ids: Vec<_> = snapshot.models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["cached-a", "cached-b"]);
    }

    #[tokio::test]
    async fn no_snapshot_returns_empty_not_error() {
        let registry = ModelRegistry::new(MemoryRepo::new(), None);
        let snapshot = registry.list("openai", false).await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.provider, "openai");
    }

    #[tokio::test]
    async fn refresh_without_fetcher_serves_cache() {
        let repo = MemoryRepo::new();
        let cached =
            ModelRegistrySnapshot::new("xai", vec![ModelInfo::new("grok-2-latest")], now_stored());
        repo.save_snapshot(&cached).unwrap();

        let registry = ModelRegistry::new(repo, None);
        let snapshot = registry.list("xai", true).await.unwrap();
        assert_eq!(snapshot.models.len(), 1);
    }

    #[tokio::test]
    async fn observed_true_overrides_unknown() {
        let repo = MemoryRepo::new();
        let cached =
            ModelRegistrySnapshot::new("openai", vec![ModelInfo::new("gpt-4o")], now_stored());
        repo.save_snapshot(&cached).unwrap();

        let mut observed = ObservedMap::new();
        let _ = observed
            .entry("gpt-4o".into())
            .or_default()
            .insert(Capability::JsonOutput, true);
        let registry = ModelRegistry::new(repo, Some(Arc::new(FixedObserved(observed))));

        let snapshot = registry.list("openai", false).await.unwrap();
        assert!(snapshot.models[0].capabilities.contains(&Capability::JsonOutput));
    }

    #[tokio::test]
    async fn observed_false_removes_advertised_capability() {
        let repo = MemoryRepo::new();
        let mut model = ModelInfo::new("gpt-4o");
        let _ = model.capabilities.insert(Capability::StructuredStreaming);
        let cached = ModelRegistrySnapshot::new("openai", vec![model], now_stored());
        repo.save_snapshot(&cached).unwrap();

        let mut observed = ObservedMap::new();
        let _ = observed
            .entry("gpt-4o".into())
            .or_default()
            .insert(Capability::StructuredStreaming, false);
        let registry = ModelRegistry::new(repo, Some(Arc::new(FixedObserved(observed))));

        let snapshot = registry.list("openai", false).await.unwrap();
        assert!(
            !snapshot.models[0]
                .capabilities
                .contains(&Capability::StructuredStreaming)
        );
    }

    #[tokio::test]
    async fn refresh_replaces_snapshot_atomically() {
        let repo = MemoryRepo::new();
        let registry = ModelRegistry::new(repo.clone(), None)
            .with_fetcher("openai", Arc::new(OkFetcher(vec!["v2-model"])));

        let old =
            ModelRegistrySnapshot::new("openai", vec![ModelInfo::new("v1-model")], now_stored());
        repo.save_snapshot(&old).unwrap();

        let snapshot = registry.list("openai", true).await.unwrap();
        assert_eq!(snapshot.models.len(), 1);
        assert_eq!(snapshot.models[0].id, "v2-model");
    }
}
