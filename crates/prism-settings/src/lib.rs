//! # prism-settings
//!
//! Configuration for the Prism core: the immutable per-provider defaults
//! table, API key resolution (environment → aliases → vault) with
//! placeholder detection and alias promotion, and the recognized process
//! environment flags.
//!
//! Key lookups go through an in-process environment overlay so alias
//! promotion never mutates the real process environment.

#![deny(unsafe_code)]

pub mod defaults;
pub mod env;
pub mod keys;
pub mod logging;

pub use defaults::{ProviderDefaults, all_providers, defaults_for};
pub use env::{
    LogLevel, db_path, is_truthy, local_provider_host, log_level, lookup_var,
    metrics_export_enabled, remove_in_process_var, set_in_process_var, use_mocks,
};
pub use keys::{is_placeholder, resolve_api_key};
pub use logging::init_tracing;
