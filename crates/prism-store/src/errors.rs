//! Store error types.

use prism_core::ports::StorageError;

/// Errors produced by the SQLite adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration failure.
    #[error("migration failed: {message}")]
    Migration {
        /// What went wrong.
        message: String,
    },
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        StorageError::from_cause("sqlite adapter failure", err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
