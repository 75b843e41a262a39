//! API key resolution.
//!
//! Resolution order per provider: canonical environment variable, alias
//! variables, persisted key vault, else `None`. Placeholder values are
//! treated as absent at every step. When an alias resolves, the canonical
//! variable is promoted in-process so every later lookup, ours or the
//! host's, sees the same value through the overlay.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use prism_core::ports::KeyVaultRepository;

use crate::defaults::ProviderDefaults;
use crate::env::{lookup_var, set_in_process_var};

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(|placeholder|your[-_].*|changeme|xxx+|sk-\*+)$")
            .expect("placeholder pattern is valid")
    })
}

/// Whether a configured value is a placeholder rather than a real key.
pub fn is_placeholder(value: &str) -> bool {
    value.trim().is_empty() || placeholder_pattern().is_match(value.trim())
}

fn usable(value: Option<String>) -> Option<String> {
    value.filter(|v| !is_placeholder(v))
}

/// Resolve the API key for a provider.
///
/// Providers that require no key resolve to `None` without consulting
/// anything. Vault read failures degrade to `None` with a warning; key
/// resolution never fails hard.
pub fn resolve_api_key(
    defaults: &ProviderDefaults,
    vault: Option<&dyn KeyVaultRepository>,
) -> Option<String> {
    let canonical = defaults.key_env?;

    if let Some(value) = usable(lookup_var(canonical)) {
        return Some(value);
    }

    for alias in defaults.key_aliases.iter().copied() {
        if let Some(value) = usable(lookup_var(alias)) {
            debug!(
                provider = defaults.name,
                alias, canonical, "API key resolved via alias; promoting canonical variable"
            );
            set_in_process_var(canonical, value.clone());
            return Some(value);
        }
    }

    if let Some(vault) = vault {
        match vault.get_key(defaults.name) {
            Ok(stored) => return usable(stored),
            Err(err) => {
                warn!(provider = defaults.name, error = %err, "key vault read failed");
            }
        }
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
