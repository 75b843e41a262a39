//! Schema migration runner.
//!
//! Migrations are embedded at compile time via [`include_str!`] and
//! executed in version order, each inside its own transaction; a failure
//! rolls back cleanly with no partial schema state. Migrations are
//! additive only; the `schema_version` table tracks what has been
//! applied, so running the migrator is idempotent.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// A single migration with a version number and SQL to execute.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in version order.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Core tables: registry, observations, chat logs, metrics, prefs, keys",
    sql: include_str!("v001_schema.sql"),
}];

/// Run all pending migrations on the given connection.
///
/// Returns the number of migrations applied.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(
                version = migration.version,
                description = migration.description,
                "migration already applied, skipping"
            );
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );

        apply_migration(conn, migration)?;
        applied += 1;
    }

    Ok(applied)
}

/// Return the highest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            message: format!("failed to read schema_version: {e}"),
        })?;
    Ok(version)
}

/// Return the latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| StoreError::Migration {
        message: format!("failed to create schema_version table: {e}"),
    })?;
    Ok(())
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| StoreError::Migration {
            message: format!("failed to open transaction: {e}"),
        })?;

    tx.execute_batch(migration.sql)
        .map_err(|e| StoreError::Migration {
            message: format!("migration v{} failed: {e}", migration.version),
        })?;

    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                migration.version,
                prism_core::time::now_stored(),
                migration.description
            ],
        )
        .map_err(|e| StoreError::Migration {
            message: format!("failed to record migration v{}: {e}", migration.version),
        })?;

    tx.commit().map_err(|e| StoreError::Migration {
        message: format!("failed to commit migration v{}: {e}", migration.version),
    })?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, new_in_memory};

    fn test_conn() -> crate::connection::PooledConnection {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        pool.get().unwrap()
    }

    #[test]
    fn migrations_apply_once() {
        let conn = test_conn();
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len() as u32);
        assert_eq!(current_version(&conn).unwrap(), latest_version());

        // Second run is a no-op.
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn all_core_tables_exist_after_migration() {
        let conn = test_conn();
        let _ = run_migrations(&conn).unwrap();
        for table in [
            "model_registry",
            "observed_capabilities",
            "chat_logs",
            "metrics",
            "prefs",
            "keys",
        ] {
            let count: u32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table: {table}");
        }
    }

    #[test]
    fn version_rows_carry_utc_timestamps() {
        let conn = test_conn();
        let _ = run_migrations(&conn).unwrap();
        let applied_at: String = conn
            .query_row("SELECT applied_at FROM schema_version WHERE version = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(applied_at.ends_with("+00:00"));
    }
}
