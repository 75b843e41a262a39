//! Tracing bootstrap for hosts.
//!
//! Installs a JSON-formatting subscriber whose level follows `LOG_LEVEL`
//! (default INFO). At DEBUG the streaming adapter's per-delta records
//! become visible; at INFO and above only lifecycle and finalize records
//! are emitted. Library code never installs a subscriber on its own;
//! hosts call this once at startup.

use tracing_subscriber::EnvFilter;

use crate::env::log_level;

/// Install the global JSON subscriber, following `LOG_LEVEL`.
///
/// Returns `false` when a subscriber was already installed (tests,
/// embedding hosts); the existing subscriber stays in place.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level().as_filter()));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
