//! Process environment flags and the in-process variable overlay.
//!
//! All lookups go through [`lookup_var`], which consults an in-process
//! overlay before the real environment. The overlay exists for two
//! reasons: alias promotion (a resolved alias populates the canonical
//! variable without mutating the process environment) and embedding
//! hosts or tests that need to set recognized variables without
//! process-global side effects.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Default local provider host.
pub const DEFAULT_LOCAL_PROVIDER_HOST: &str = "http://127.0.0.1:11434";

fn overlay() -> &'static RwLock<HashMap<String, String>> {
    static OVERLAY: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();
    OVERLAY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Read a variable: overlay first, then the process environment.
pub fn lookup_var(name: &str) -> Option<String> {
    if let Some(value) = overlay().read().ok()?.get(name) {
        return Some(value.clone());
    }
    std::env::var(name).ok()
}

/// Set an in-process variable, shadowing the process environment.
pub fn set_in_process_var(name: impl Into<String>, value: impl Into<String>) {
    if let Ok(mut map) = overlay().write() {
        let _ = map.insert(name.into(), value.into());
    }
}

/// Remove an in-process variable (the process environment still applies).
pub fn remove_in_process_var(name: &str) {
    if let Ok(mut map) = overlay().write() {
        let _ = map.remove(name);
    }
}

/// Log verbosity, following the process-wide `LOG_LEVEL`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Per-delta records and everything below.
    Debug,
    /// Finalize records and lifecycle milestones (the default).
    #[default]
    Info,
    /// Fallbacks and degraded behavior.
    Warning,
    /// Failures surfaced to callers.
    Error,
    /// Unrecoverable conditions.
    Critical,
}

impl LogLevel {
    /// Parse a level name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// `tracing` filter directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

/// Effective log level from `LOG_LEVEL` (default INFO).
pub fn log_level() -> LogLevel {
    lookup_var("LOG_LEVEL")
        .and_then(|v| LogLevel::parse(&v))
        .unwrap_or_default()
}

/// Truthiness used by `METRICS_EXPORT` and `USE_MOCKS`.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Whether metrics export is enabled (`METRICS_EXPORT`, default off).
pub fn metrics_export_enabled() -> bool {
    lookup_var("METRICS_EXPORT").is_some_and(|v| is_truthy(&v))
}

/// Whether the factory substitutes mock providers (`USE_MOCKS`, default off).
pub fn use_mocks() -> bool {
    lookup_var("USE_MOCKS").is_some_and(|v| is_truthy(&v))
}

/// Persistence file location (`DB_PATH`), if configured.
pub fn db_path() -> Option<String> {
    lookup_var("DB_PATH").filter(|v| !v.trim().is_empty())
}

/// Local provider host (`LOCAL_PROVIDER_HOST`, defaulted).
pub fn local_provider_host() -> String {
    lookup_var("LOCAL_PROVIDER_HOST")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOCAL_PROVIDER_HOST.to_owned())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_shadows_process_env() {
        set_in_process_var("PRISM_TEST_SHADOW", "from-overlay");
        assert_eq!(lookup_var("PRISM_TEST_SHADOW").as_deref(), Some("from-overlay"));
        remove_in_process_var("PRISM_TEST_SHADOW");
        assert_eq!(lookup_var("PRISM_TEST_SHADOW"), None);
    }

    #[test]
    fn log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("INFO"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("Warning"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("CRITICAL"), Some(LogLevel::Critical));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn log_level_default_is_info() {
        remove_in_process_var("LOG_LEVEL");
        assert_eq!(log_level(), LogLevel::Info);

        set_in_process_var("LOG_LEVEL", "nonsense");
        assert_eq!(log_level(), LogLevel::Info);
        remove_in_process_var("LOG_LEVEL");
    }

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "TRUE", "yes", "on", " On "] {
            assert!(is_truthy(v), "{v} should be truthy");
        }
        for v in ["0", "false", "off", "", "2", "no"] {
            assert!(!is_truthy(v), "{v} should be falsy");
        }
    }

    #[test]
    fn use_mocks_flag() {
        remove_in_process_var("USE_MOCKS");
        assert!(!use_mocks());
        set_in_process_var("USE_MOCKS", "1");
        assert!(use_mocks());
        set_in_process_var("USE_MOCKS", "0");
        assert!(!use_mocks());
        remove_in_process_var("USE_MOCKS");
    }

    #[test]
    fn local_provider_host_default() {
        remove_in_process_var("LOCAL_PROVIDER_HOST");
        assert_eq!(local_provider_host(), DEFAULT_LOCAL_PROVIDER_HOST);
        set_in_process_var("LOCAL_PROVIDER_HOST", "http://10.0.0.2:11434");
        assert_eq!(local_provider_host(), "http://10.0.0.2:11434");
        remove_in_process_var("LOCAL_PROVIDER_HOST");
    }

    #[test]
    fn db_path_empty_is_none() {
        set_in_process_var("DB_PATH", "   ");
        assert_eq!(db_path(), None);
        set_in_process_var("DB_PATH", "/tmp/prism.db");
        assert_eq!(db_path().as_deref(), Some("/tmp/prism.db"));
        remove_in_process_var("DB_PATH");
    }
}
