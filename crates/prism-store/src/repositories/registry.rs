//! Model registry snapshot repository.
//!
//! One row per provider. A save atomically replaces the prior snapshot
//! inside a transaction; a failed live fetch therefore never clobbers
//! cached data because the registry only calls save on success.

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use prism_core::model::ModelRegistrySnapshot;
use prism_core::ports::{ModelRegistryRepository, StorageResult};
use prism_core::time::{normalize_for_storage, parse_stored, to_stored};

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// SQLite-backed snapshot repository.
#[derive(Clone)]
pub struct RegistryRepo {
    pool: ConnectionPool,
}

impl RegistryRepo {
    /// New handle over the shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn save_inner(&self, snapshot: &ModelRegistrySnapshot) -> Result<()> {
        let mut normalized = snapshot.clone();
        normalized.fetched_at = normalize_for_storage(&snapshot.fetched_at);
        for model in &mut normalized.models {
            if let Some(updated) = &model.updated_at {
                model.updated_at = Some(normalize_for_storage(updated));
            }
        }
        let snapshot_json = serde_json::to_string(&normalized)?;

        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        let _ = tx.execute(
            "DELETE FROM model_registry WHERE provider = ?1",
            params![normalized.provider],
        )?;
        let _ = tx.execute(
            "INSERT INTO model_registry (provider, snapshot_json, fetched_at) VALUES (?1, ?2, ?3)",
            params![normalized.provider, snapshot_json, normalized.fetched_at],
        )?;
        tx.commit()?;

        debug!(
            provider = %normalized.provider,
            models = normalized.models.len(),
            "registry snapshot replaced"
        );
        Ok(())
    }

    fn load_inner(&self, provider: &str) -> Result<Option<ModelRegistrySnapshot>> {
        let conn = self.pool.get()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT snapshot_json, fetched_at FROM model_registry WHERE provider = ?1",
                params![provider],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((snapshot_json, fetched_at)) = row else {
            return Ok(None);
        };

        let mut snapshot: ModelRegistrySnapshot = serde_json::from_str(&snapshot_json)?;
        // Stored timestamps read back UTC-aware; malformed → epoch.
        snapshot.fetched_at = to_stored(parse_stored(&fetched_at));
        Ok(Some(snapshot))
    }
}

impl ModelRegistryRepository for RegistryRepo {
    fn save_snapshot(&self, snapshot: &ModelRegistrySnapshot) -> StorageResult<()> {
        self.save_inner(snapshot).map_err(Into::into)
    }

    fn load_snapshot(&self, provider: &str) -> StorageResult<Option<ModelRegistrySnapshot>> {
        self.load_inner(provider).map_err(Into::into)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
