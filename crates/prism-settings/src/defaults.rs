//! The immutable per-provider defaults table.
//!
//! Fixed at compile time; nothing mutates it after process startup.
//! Base URLs are defaults only; the factory lets callers override them.

/// Compile-time defaults for one provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderDefaults {
    /// Canonical name used by the factory and in logs.
    pub name: &'static str,
    /// Model used when the request does not name one.
    pub default_model: &'static str,
    /// Default API base URL.
    pub base_url: &'static str,
    /// Whether an API key is required.
    pub requires_key: bool,
    /// Canonical key environment variable, if any.
    pub key_env: Option<&'static str>,
    /// Accepted alias variables, checked after the canonical one.
    pub key_aliases: &'static [&'static str],
}

/// Default SQLite busy timeout in milliseconds.
pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 5_000;
/// Default SQLite pool size.
pub const SQLITE_POOL_SIZE: u32 = 8;
/// Default HTTP connection pool size per host.
pub const HTTP_POOL_MAX_IDLE_PER_HOST: usize = 10;
/// Default start-phase timeout in seconds.
pub const START_TIMEOUT_SECONDS: u64 = 30;

/// All known providers.
static PROVIDERS: &[ProviderDefaults] = &[
    ProviderDefaults {
        name: "openai",
        default_model: "gpt-4o-mini",
        base_url: "https://api.openai.com/v1",
        requires_key: true,
        key_env: Some("OPENAI_API_KEY"),
        key_aliases: &[],
    },
    ProviderDefaults {
        name: "anthropic",
        default_model: "claude-sonnet-4-5",
        base_url: "https://api.anthropic.com",
        requires_key: true,
        key_env: Some("ANTHROPIC_API_KEY"),
        key_aliases: &[],
    },
    ProviderDefaults {
        name: "gemini",
        default_model: "gemini-2.0-flash",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        requires_key: true,
        key_env: Some("GEMINI_API_KEY"),
        key_aliases: &["GOOGLE_API_KEY"],
    },
    ProviderDefaults {
        name: "deepseek",
        default_model: "deepseek-chat",
        base_url: "https://api.deepseek.com/v1",
        requires_key: true,
        key_env: Some("DEEPSEEK_API_KEY"),
        key_aliases: &[],
    },
    ProviderDefaults {
        name: "openrouter",
        default_model: "openrouter/auto",
        base_url: "https://openrouter.ai/api/v1",
        requires_key: true,
        key_env: Some("OPENROUTER_API_KEY"),
        key_aliases: &[],
    },
    ProviderDefaults {
        name: "xai",
        default_model: "grok-2-latest",
        base_url: "https://api.x.ai/v1",
        requires_key: true,
        key_env: Some("XAI_API_KEY"),
        key_aliases: &[],
    },
    ProviderDefaults {
        name: "ollama",
        default_model: "llama3.2",
        base_url: "http://127.0.0.1:11434",
        requires_key: false,
        key_env: None,
        key_aliases: &[],
    },
    ProviderDefaults {
        name: "mock",
        default_model: "mock-small",
        base_url: "mock://",
        requires_key: false,
        key_env: None,
        key_aliases: &[],
    },
];

/// Defaults for a canonical provider name, or `None` if unknown.
pub fn defaults_for(name: &str) -> Option<&'static ProviderDefaults> {
    PROVIDERS.iter().find(|p| p.name == name)
}

/// All provider defaults, in table order.
pub fn all_providers() -> &'static [ProviderDefaults] {
    PROVIDERS
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
