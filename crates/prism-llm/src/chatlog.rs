//! Chat log persistence helper.
//!
//! Adapters append one log row per chat invocation (request payload plus
//! the response or the normalized error) unless the
//! `chat_logging.enabled` preference turns it off. Payloads are persisted
//! verbatim; redaction is a host policy layered above the port.

use std::sync::Arc;

use tracing::warn;

use prism_core::error::ProviderError;
use prism_core::message::ChatRequest;
use prism_core::ports::{ChatLogRepository, PrefsRepository};
use prism_core::records::ChatLog;
use prism_core::response::ChatResponse;

/// Preference key gating chat log writes.
pub const CHAT_LOGGING_PREF: &str = "chat_logging.enabled";

/// Append a chat log entry, honoring the logging preference.
///
/// Never fails the invocation: persistence problems degrade to a warning.
pub fn append_chat_log(
    repo: Option<&Arc<dyn ChatLogRepository>>,
    prefs: Option<&Arc<dyn PrefsRepository>>,
    provider: &str,
    model: &str,
    request: &ChatRequest,
    outcome: Result<&ChatResponse, &ProviderError>,
) {
    let Some(repo) = repo else {
        return;
    };

    let enabled = prefs
        .map_or(Ok(true), |p| p.get_bool(CHAT_LOGGING_PREF, true))
        .unwrap_or(true);
    if !enabled {
        return;
    }

    let request_payload = match serde_json::to_value(request) {
        Ok(value) => value,
        Err(err) => {
            warn!(provider, error = %err, "failed to serialize chat request for logging");
            return;
        }
    };

    let response_payload = match outcome {
        Ok(response) => serde_json::to_value(response).unwrap_or_else(|_| {
            serde_json::json!({"error": "internal:response serialization failed"})
        }),
        Err(error) => serde_json::json!({"error": error.terminal_string()}),
    };

    let log = ChatLog::new(provider, model, request_payload, response_payload);
    if let Err(err) = repo.append(log) {
        warn!(provider, error = %err, "failed to append chat log");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
