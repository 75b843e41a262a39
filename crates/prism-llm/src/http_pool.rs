//! Shared HTTP client pool.
//!
//! One long-lived, connection-reusing client per (provider, base URL)
//! pair, built lazily and reused for the life of the process. The pool is
//! constructed at the composition root and passed by reference into
//! adapters, never looked up through module-level state, so tests can
//! isolate it. Clients never carry request-scoped state.

use std::collections::HashMap;
use std::sync::Mutex;

use prism_core::error::{ErrorCode, ProviderError};

use prism_settings::defaults::HTTP_POOL_MAX_IDLE_PER_HOST;

/// Process-wide HTTP client pool keyed by (provider, base URL).
pub struct HttpClientPool {
    clients: Mutex<HashMap<(String, String), reqwest::Client>>,
    max_idle_per_host: usize,
}

impl Default for HttpClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientPool {
    /// Pool with the default per-host idle connection limit.
    pub fn new() -> Self {
        Self::with_max_idle(HTTP_POOL_MAX_IDLE_PER_HOST)
    }

    /// Pool with an explicit per-host idle connection limit.
    pub fn with_max_idle(max_idle_per_host: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            max_idle_per_host,
        }
    }

    /// Get (or lazily build) the client for `provider` at `base_url`.
    ///
    /// `reqwest::Client` is internally reference-counted, so the returned
    /// clone shares the underlying connection pool.
    pub fn client(&self, provider: &str, base_url: &str) -> Result<reqwest::Client, ProviderError> {
        let key = (provider.to_owned(), base_url.to_owned());

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| ProviderError::internal("HTTP pool lock poisoned"))?;

        if let Some(existing) = clients.get(&key) {
            return Ok(existing.clone());
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(self.max_idle_per_host)
            .build()
            .map_err(|e| {
                ProviderError::new(ErrorCode::Internal, format!("failed to build HTTP client: {e}"))
                    .with_provider(provider)
            })?;
        let _ = clients.insert(key, client.clone());
        Ok(client)
    }

    /// Number of distinct clients built so far.
    pub fn len(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether no client has been built yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_reuses_client() {
        let pool = HttpClientPool::new();
        let _a = pool.client("openai", "https://api.openai.com/v1").unwrap();
        let _b = pool.client("openai", "https://api.openai.com/v1").unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn different_keys_build_distinct_clients() {
        let pool = HttpClientPool::new();
        let _a = pool.client("openai", "https://api.openai.com/v1").unwrap();
        let _b = pool.client("openai", "http://localhost:8080").unwrap();
        let _c = pool.client("xai", "https://api.x.ai/v1").unwrap();
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn fresh_pool_is_empty() {
        let pool = HttpClientPool::new();
        assert!(pool.is_empty());
    }
}
