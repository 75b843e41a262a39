//! Typed key-value preferences.
//!
//! Values are stored as JSON text, so callers keep their types across the
//! persistence boundary.

use rusqlite::{OptionalExtension, params};
use serde_json::Value;

use prism_core::ports::{PrefsRepository, StorageResult};
use prism_core::time::now_stored;

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// SQLite-backed preferences repository.
#[derive(Clone)]
pub struct PrefsRepo {
    pool: ConnectionPool,
}

impl PrefsRepo {
    /// New handle over the shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn get_inner(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.pool.get()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM prefs WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set_inner(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO prefs (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, text, now_stored()],
        )?;
        Ok(())
    }
}

impl PrefsRepository for PrefsRepo {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.get_inner(key).map_err(Into::into)
    }

    fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        self.set_inner(key, value).map_err(Into::into)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
