//! Append-only chat log repository.
//!
//! Rows are created exclusively here: the repository assigns both the row
//! ID and `created_at`, and nothing ever updates a persisted row.

use rusqlite::params;

use prism_core::ports::{ChatLogRepository, StorageResult};
use prism_core::records::ChatLog;
use prism_core::time::now_stored;

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// SQLite-backed chat log.
#[derive(Clone)]
pub struct ChatLogRepo {
    pool: ConnectionPool,
}

impl ChatLogRepo {
    /// New handle over the shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn append_inner(&self, mut log: ChatLog) -> Result<ChatLog> {
        let created_at = now_stored();
        let request_json = serde_json::to_string(&log.request_payload)?;
        let response_json = serde_json::to_string(&log.response_payload)?;

        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO chat_logs (provider, model, request_json, response_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![log.provider, log.model, request_json, response_json, created_at],
        )?;

        log.id = Some(conn.last_insert_rowid());
        log.created_at = created_at;
        Ok(log)
    }

    /// Number of persisted rows, optionally filtered by provider.
    pub fn count(&self, provider: Option<&str>) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: u64 = match provider {
            Some(p) => conn.query_row(
                "SELECT COUNT(*) FROM chat_logs WHERE provider = ?1",
                params![p],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM chat_logs", [], |row| row.get(0))?,
        };
        Ok(count)
    }
}

impl ChatLogRepository for ChatLogRepo {
    fn append(&self, log: ChatLog) -> StorageResult<ChatLog> {
        self.append_inner(log).map_err(Into::into)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
