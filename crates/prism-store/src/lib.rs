//! # prism-store
//!
//! Reference SQLite adapter for the Prism persistence ports.
//!
//! One embedded file database with WAL journaling and a busy timeout.
//! Repositories are thin structs over a shared connection pool; every
//! multi-statement write runs in a transaction that commits or rolls back
//! atomically. The UTC timestamp normalization policy is enforced here:
//! naive timestamps are coerced to UTC on write, malformed stored values
//! read back as the epoch sentinel.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use errors::{Result, StoreError};
pub use repositories::SqliteStore;
