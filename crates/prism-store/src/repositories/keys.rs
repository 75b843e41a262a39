//! Provider API key vault.
//!
//! Keys are opaque bytes to the store. The port contract permits an
//! implementation to encrypt at rest transparently; this reference
//! implementation stores the raw bytes.

use rusqlite::{OptionalExtension, params};
use tracing::warn;

use prism_core::ports::{KeyVaultRepository, StorageResult};
use prism_core::time::now_stored;

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// SQLite-backed key vault.
#[derive(Clone)]
pub struct KeyVaultRepo {
    pool: ConnectionPool,
}

impl KeyVaultRepo {
    /// New handle over the shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn get_inner(&self, provider: &str) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT value_blob FROM keys WHERE provider = ?1",
                params![provider],
                |row| row.get(0),
            )
            .optional()?;

        Ok(blob.and_then(|bytes| match String::from_utf8(bytes) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(provider, "stored key is not valid UTF-8; ignoring");
                None
            }
        }))
    }

    fn set_inner(&self, provider: &str, value: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO keys (provider, value_blob, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (provider) DO UPDATE SET
               value_blob = excluded.value_blob,
               updated_at = excluded.updated_at",
            params![provider, value.as_bytes(), now_stored()],
        )?;
        Ok(())
    }
}

impl KeyVaultRepository for KeyVaultRepo {
    fn get_key(&self, provider: &str) -> StorageResult<Option<String>> {
        self.get_inner(provider).map_err(Into::into)
    }

    fn set_key(&self, provider: &str, value: &str) -> StorageResult<()> {
        self.set_inner(provider, value).map_err(Into::into)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
