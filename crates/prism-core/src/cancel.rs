//! Cooperative stream cancellation.
//!
//! [`StreamController`] wraps a [`CancellationToken`] and remembers the
//! caller-supplied reason. Cancellation is cooperative, not preemptive:
//! the streaming adapter checkpoints the token before translating each
//! native chunk, after a successful drain, and before retry attempts. It
//! never force-terminates in-flight transport I/O.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Handle for cancelling an active stream.
///
/// Cloning is cheap; all clones observe the same state. Issuing
/// [`cancel`](Self::cancel) guarantees the stream produces a terminal
/// event with error code `cancelled` within one chunk of delay.
#[derive(Clone, Debug, Default)]
pub struct StreamController {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl StreamController {
    /// New, un-signalled controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation with a reason. Only the first call's reason
    /// is kept; later calls are no-ops.
    pub fn cancel(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason passed to the first [`cancel`](Self::cancel) call.
    pub fn reason(&self) -> Option<String> {
        self.reason.get().cloned()
    }

    /// The reason, or `"cancelled"` when signalled without one recorded.
    pub fn reason_or_default(&self) -> String {
        self.reason().unwrap_or_else(|| "cancelled".to_owned())
    }

    /// The underlying token, for `select!`-style waits.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_controller_not_cancelled() {
        let controller = StreamController::new();
        assert!(!controller.is_cancelled());
        assert_eq!(controller.reason(), None);
    }

    #[test]
    fn cancel_sets_flag_and_reason() {
        let controller = StreamController::new();
        controller.cancel("user");
        assert!(controller.is_cancelled());
        assert_eq!(controller.reason().as_deref(), Some("user"));
    }

    #[test]
    fn first_reason_wins() {
        let controller = StreamController::new();
        controller.cancel("first");
        controller.cancel("second");
        assert_eq!(controller.reason().as_deref(), Some("first"));
    }

    #[test]
    fn clones_share_state() {
        let controller = StreamController::new();
        let observer = controller.clone();
        controller.cancel("shared");
        assert!(observer.is_cancelled());
        assert_eq!(observer.reason().as_deref(), Some("shared"));
    }

    #[test]
    fn reason_or_default_without_reason() {
        let controller = StreamController::new();
        assert_eq!(controller.reason_or_default(), "cancelled");
        controller.cancel("why");
        assert_eq!(controller.reason_or_default(), "why");
    }

    #[tokio::test]
    async fn token_wakes_waiters() {
        let controller = StreamController::new();
        let token = controller.token().clone();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        controller.cancel("done");
        waiter.await.unwrap();
    }
}
