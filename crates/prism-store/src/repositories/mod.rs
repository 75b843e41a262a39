//! Repository implementations over the shared connection pool.
//!
//! [`SqliteStore`] opens the database, runs migrations, and hands out
//! repository handles. Each handle is a cheap clone of the pool and
//! implements one persistence port from `prism-core`.

pub mod chat_log;
pub mod keys;
pub mod metrics;
pub mod observed;
pub mod prefs;
pub mod registry;

pub use chat_log::ChatLogRepo;
pub use keys::KeyVaultRepo;
pub use metrics::MetricsRepo;
pub use observed::ObservedRepo;
pub use prefs::PrefsRepo;
pub use registry::RegistryRepo;

use crate::connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
use crate::errors::Result;
use crate::migrations::run_migrations;

/// The reference SQLite store: pool + migrations + repository handles.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (or create) a file-backed store and run pending migrations.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_config(path, &ConnectionConfig::default())
    }

    /// Open with an explicit pool configuration.
    pub fn open_with_config(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = new_file(path, config)?;
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
        Ok(Self { pool })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let pool = new_in_memory(&ConnectionConfig::default())?;
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Model registry snapshot repository.
    pub fn registry(&self) -> RegistryRepo {
        RegistryRepo::new(self.pool.clone())
    }

    /// Observed capability store.
    pub fn observed(&self) -> ObservedRepo {
        ObservedRepo::new(self.pool.clone())
    }

    /// Chat log repository.
    pub fn chat_logs(&self) -> ChatLogRepo {
        ChatLogRepo::new(self.pool.clone())
    }

    /// Metrics repository.
    pub fn metrics(&self) -> MetricsRepo {
        MetricsRepo::new(self.pool.clone())
    }

    /// Preferences repository.
    pub fn prefs(&self) -> PrefsRepo {
        PrefsRepo::new(self.pool.clone())
    }

    /// Key vault repository.
    pub fn key_vault(&self) -> KeyVaultRepo {
        KeyVaultRepo::new(self.pool.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_migrates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.pool().get().unwrap();
        let version = crate::migrations::current_version(&conn).unwrap();
        assert_eq!(version, crate::migrations::latest_version());
    }

    #[test]
    fn open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prism.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        drop(store);

        // Reopening is idempotent.
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        let conn = store.pool().get().unwrap();
        assert_eq!(
            crate::migrations::current_version(&conn).unwrap(),
            crate::migrations::latest_version()
        );
    }
}
