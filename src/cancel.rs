//! Cooperative cancellation, wired to Ctrl-C.
//!
//! Mirrors the Go sibling's `signal.NotifyContext(ctx, os.Interrupt,
//! os.Kill)`: the driver polls a token rather than being torn down
//! mid-transaction, so an in-flight chunk always finishes its
//! commit-or-rollback before the process exits.

use tokio_util::sync::CancellationToken;

/// Returns a token that cancels the first time the process receives
/// Ctrl-C. Listens in a background task so callers don't need to poll
/// the signal themselves.
pub fn from_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, shutting down after the current chunk");
            child.cancel();
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
