//! Observed capability store.
//!
//! Upserts are idempotent and monotonic: the stored row only changes when
//! the incoming observation is at least as recent. Stored timestamps use
//! the fixed-width UTC format, so lexicographic comparison in SQL matches
//! chronological order.

use rusqlite::params;
use tracing::warn;

use prism_core::model::{Capability, ObservedCapability};
use prism_core::ports::{ObservedCapabilityStore, ObservedMap, StorageResult};
use prism_core::time::normalize_for_storage;

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// SQLite-backed observation store.
#[derive(Clone)]
pub struct ObservedRepo {
    pool: ConnectionPool,
}

impl ObservedRepo {
    /// New handle over the shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn record_inner(&self, observation: &ObservedCapability) -> Result<()> {
        let observed_at = normalize_for_storage(&observation.observed_at);
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO observed_capabilities (provider, model_id, feature, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (provider, model_id, feature) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at
             WHERE excluded.updated_at >= observed_capabilities.updated_at",
            params![
                observation.provider,
                observation.model_id,
                observation.feature.as_str(),
                i32::from(observation.value),
                observed_at,
            ],
        )?;
        Ok(())
    }

    fn load_inner(&self, provider: &str) -> Result<ObservedMap> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT model_id, feature, value FROM observed_capabilities WHERE provider = ?1",
        )?;
        let rows = stmt.query_map(params![provider], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
            ))
        })?;

        let mut map = ObservedMap::new();
        for row in rows {
            let (model_id, feature, value) = row?;
            let Ok(feature) = feature.parse::<Capability>() else {
                warn!(provider, model_id = %model_id, feature = %feature, "skipping unknown stored capability");
                continue;
            };
            let _ = map
                .entry(model_id)
                .or_default()
                .insert(feature, value != 0);
        }
        Ok(map)
    }
}

impl ObservedCapabilityStore for ObservedRepo {
    fn record(&self, observation: &ObservedCapability) -> StorageResult<()> {
        self.record_inner(observation).map_err(Into::into)
    }

    fn load(&self, provider: &str) -> StorageResult<ObservedMap> {
        self.load_inner(provider).map_err(Into::into)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
