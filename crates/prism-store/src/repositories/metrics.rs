//! Append-only stream metrics repository.

use rusqlite::params;

use prism_core::error::ErrorCode;
use prism_core::ports::{MetricsRepository, StorageResult};
use prism_core::records::MetricsRecord;
use prism_core::time::now_stored;

use crate::connection::ConnectionPool;
use crate::errors::Result;

/// SQLite-backed metrics repository.
#[derive(Clone)]
pub struct MetricsRepo {
    pool: ConnectionPool,
}

impl MetricsRepo {
    /// New handle over the shared pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn append_inner(&self, mut record: MetricsRecord) -> Result<MetricsRecord> {
        let created_at = now_stored();
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO metrics
               (provider, model, emitted_count, ttft_ms, total_ms, error_code, correlation_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.provider,
                record.model,
                record.emitted_count,
                record.ttft_ms,
                record.total_ms,
                record.error_code.map(ErrorCode::as_str),
                record.correlation_id,
                created_at,
            ],
        )?;

        record.id = Some(conn.last_insert_rowid());
        record.created_at = created_at;
        Ok(record)
    }

    /// Number of persisted rows for a provider.
    pub fn count(&self, provider: &str) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM metrics WHERE provider = ?1",
            params![provider],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl MetricsRepository for MetricsRepo {
    fn append(&self, record: MetricsRecord) -> StorageResult<MetricsRecord> {
        self.append_inner(record).map_err(Into::into)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
