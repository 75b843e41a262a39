//! Provider factory.
//!
//! Canonical provider names resolve to adapter constructors. The factory
//! owns the cross-cutting services (HTTP pool, persistence ports, metrics
//! exporter, retry policy) built once at the composition root and hands
//! each adapter what it needs. Unknown names fail with `unsupported`.
//! When `USE_MOCKS` is truthy, every name resolves to the mock provider,
//! which preserves all lifecycle invariants.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use prism_core::error::{ErrorCode, ProviderError};
use prism_core::ports::{
    ChatLogRepository, KeyVaultRepository, MetricsRepository, ObservedCapabilityStore,
    PrefsRepository,
};
use prism_core::retry::RetryPolicy;

use prism_settings::defaults::{ProviderDefaults, START_TIMEOUT_SECONDS, defaults_for};
use prism_settings::{metrics_export_enabled, resolve_api_key, use_mocks};

use crate::http_pool::HttpClientPool;
use crate::metrics::MetricsExporter;
use crate::provider::{Provider, ProviderResult};
use crate::providers::{
    AnthropicProvider, GeminiProvider, MockProvider, OllamaProvider, OpenAiCompatProvider,
};

/// Cross-cutting services shared by every adapter.
///
/// Built once at the composition root; adapters hold cheap clones. Every
/// port is optional; a missing port degrades the corresponding concern
/// (no chat logs, no observations) without affecting request handling.
#[derive(Clone)]
pub struct ProviderServices {
    /// Chat log persistence.
    pub chat_logs: Option<Arc<dyn ChatLogRepository>>,
    /// Preference reads (chat-log gating).
    pub prefs: Option<Arc<dyn PrefsRepository>>,
    /// Observed capability writes.
    pub observed: Option<Arc<dyn ObservedCapabilityStore>>,
    /// Stream metrics persistence.
    pub metrics_repo: Option<Arc<dyn MetricsRepository>>,
    /// Metrics exporter; `None` when export is gated off.
    pub exporter: Option<Arc<dyn MetricsExporter>>,
    /// Start-phase retry policy.
    pub retry: RetryPolicy,
    /// Start-phase deadline.
    pub start_timeout: Duration,
}

impl Default for ProviderServices {
    fn default() -> Self {
        Self {
            chat_logs: None,
            prefs: None,
            observed: None,
            metrics_repo: None,
            exporter: None,
            retry: RetryPolicy::default(),
            start_timeout: Duration::from_secs(START_TIMEOUT_SECONDS),
        }
    }
}

/// Options for one `create` call.
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    /// Override the provider's default base URL.
    pub base_url: Option<String>,
    /// Override the provider's default model.
    pub default_model: Option<String>,
    /// Explicit API key, bypassing resolution.
    pub api_key: Option<String>,
}

/// The provider factory.
pub struct ProviderFactory {
    http: Arc<HttpClientPool>,
    services: ProviderServices,
    key_vault: Option<Arc<dyn KeyVaultRepository>>,
}

impl ProviderFactory {
    /// Factory over the shared services.
    pub fn new(
        http: Arc<HttpClientPool>,
        services: ProviderServices,
        key_vault: Option<Arc<dyn KeyVaultRepository>>,
    ) -> Self {
        Self {
            http,
            services,
            key_vault,
        }
    }

    /// Services with the exporter gated by `METRICS_EXPORT`.
    ///
    /// When the flag is falsy the exporter slot is cleared entirely, so
    /// no emission call is ever made.
    #[must_use]
    pub fn gate_exporter(mut services: ProviderServices) -> ProviderServices {
        if !metrics_export_enabled() {
            services.exporter = None;
        }
        services
    }

    /// Instantiate the adapter for a canonical provider name.
    pub fn create(&self, name: &str, options: &CreateOptions) -> ProviderResult<Arc<dyn Provider>> {
        let defaults = defaults_for(name).ok_or_else(|| {
            ProviderError::new(ErrorCode::Unsupported, format!("unknown provider: {name}"))
                .with_provider(name)
                .with_operation("create")
        })?;

        if use_mocks() {
            debug!(provider = name, "USE_MOCKS is set; substituting mock provider");
            return Ok(Arc::new(MockProvider::new(self.services.clone())));
        }

        let base_url = options
            .base_url
            .clone()
            .unwrap_or_else(|| self.default_base_url(defaults));
        let default_model = options
            .default_model
            .clone()
            .unwrap_or_else(|| defaults.default_model.to_owned());
        let api_key = self.resolve_key(defaults, options)?;
        let client = self.http.client(name, &base_url)?;
        let services = self.services.clone();

        let provider: Arc<dyn Provider> = match name {
            "openai" => Arc::new(OpenAiCompatProvider::openai(
                base_url,
                api_key,
                default_model,
                client,
                services,
            )),
            "deepseek" => Arc::new(OpenAiCompatProvider::deepseek(
                base_url,
                api_key,
                default_model,
                client,
                services,
            )),
            "openrouter" => Arc::new(OpenAiCompatProvider::openrouter(
                base_url,
                api_key,
                default_model,
                client,
                services,
            )),
            "xai" => Arc::new(OpenAiCompatProvider::xai(
                base_url,
                api_key,
                default_model,
                client,
                services,
            )),
            "anthropic" => Arc::new(AnthropicProvider::new(
                base_url,
                api_key,
                default_model,
                client,
                services,
            )),
            "gemini" => Arc::new(GeminiProvider::new(
                base_url,
                api_key,
                default_model,
                client,
                services,
            )),
            "ollama" => Arc::new(OllamaProvider::new(base_url, default_model, client, services)),
            "mock" => Arc::new(MockProvider::new(services)),
            other => {
                // The defaults table and this match are maintained together.
                return Err(ProviderError::internal(format!(
                    "provider {other} has defaults but no constructor"
                ))
                .with_provider(other)
                .with_operation("create"));
            }
        };
        Ok(provider)
    }

    fn default_base_url(&self, defaults: &ProviderDefaults) -> String {
        if defaults.name == "ollama" {
            prism_settings::local_provider_host()
        } else {
            defaults.base_url.to_owned()
        }
    }

    fn resolve_key(
        &self,
        defaults: &ProviderDefaults,
        options: &CreateOptions,
    ) -> ProviderResult<Option<String>> {
        if let Some(key) = &options.api_key {
            return Ok(Some(key.clone()));
        }
        let resolved = resolve_api_key(defaults, self.key_vault.as_deref());
        if defaults.requires_key && resolved.is_none() {
            return Err(ProviderError::new(
                ErrorCode::Auth,
                format!("no API key resolved for provider {}", defaults.name),
            )
            .with_provider(defaults.name)
            .with_operation("create"));
        }
        Ok(resolved)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use prism_settings::{remove_in_process_var, set_in_process_var};
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn factory() -> ProviderFactory {
        ProviderFactory::new(
            Arc::new(HttpClientPool::new()),
            ProviderServices::default(),
            None,
        )
    }

    #[test]
    fn unknown_provider_is_unsupported() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_in_process_var("USE_MOCKS");
        let err = factory()
            .create("skynet", &CreateOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::Unsupported);
    }

    #[test]
    fn keyed_provider_without_key_fails_auth() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_in_process_var("USE_MOCKS");
        // A placeholder shadows any real key and resolves as absent.
        set_in_process_var("DEEPSEEK_API_KEY", "placeholder");
        let err = factory()
            .create("deepseek", &CreateOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::Auth);
        remove_in_process_var("DEEPSEEK_API_KEY");
    }

    #[test]
    fn explicit_key_bypasses_resolution() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_in_process_var("USE_MOCKS");
        let options = CreateOptions {
            api_key: Some("sk-explicit".into()),
            ..CreateOptions::default()
        };
        let provider = factory().create("openai", &options).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn keyless_provider_creates_without_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_in_process_var("USE_MOCKS");
        let provider = factory().create("ollama", &CreateOptions::default()).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn use_mocks_substitutes_mock_provider() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_in_process_var("USE_MOCKS", "1");
        let provider = factory().create("openai", &CreateOptions::default()).unwrap();
        assert_eq!(provider.name(), "mock");
        remove_in_process_var("USE_MOCKS");
    }

    #[test]
    fn unknown_name_still_fails_under_mocks() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_in_process_var("USE_MOCKS", "1");
        let err = factory()
            .create("skynet", &CreateOptions::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::Unsupported);
        remove_in_process_var("USE_MOCKS");
    }

    #[test]
    fn gate_exporter_clears_when_disabled() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_in_process_var("METRICS_EXPORT");
        let services = ProviderServices {
            exporter: Some(Arc::new(crate::metrics::NoopExporter)),
            ..ProviderServices::default()
        };
        let gated = ProviderFactory::gate_exporter(services);
        assert!(gated.exporter.is_none());
    }

    #[test]
    fn gate_exporter_keeps_when_enabled() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_in_process_var("METRICS_EXPORT", "1");
        let services = ProviderServices {
            exporter: Some(Arc::new(crate::metrics::NoopExporter)),
            ..ProviderServices::default()
        };
        let gated = ProviderFactory::gate_exporter(services);
        assert!(gated.exporter.is_some());
        remove_in_process_var("METRICS_EXPORT");
    }

    #[test]
    fn ollama_base_url_follows_local_provider_host() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_in_process_var("USE_MOCKS");
        set_in_process_var("LOCAL_PROVIDER_HOST", "http://10.1.1.1:11434");
        let provider = factory().create("ollama", &CreateOptions::default()).unwrap();
        assert_eq!(provider.name(), "ollama");
        remove_in_process_var("LOCAL_PROVIDER_HOST");
    }
}
