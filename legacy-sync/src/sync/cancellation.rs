//! Shutdown signalling for background tasks

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// A cancellation token shared between a background task and its owner
///
/// # Examples
///
/// ```rust
/// use legacy_sync::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///     let task_token = token.clone();
///     let handle = tokio::spawn(async move { task_token.cancelled().await });
///
///     token.cancel();
///     handle.await.unwrap();
///     assert!(token.is_cancelled());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            state: Arc::new(CancellationState { tx, rx }),
        }
    }

    /// Check if cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.rx.borrow()
    }

    /// Request cancellation for every clone of this token
    pub fn cancel(&self) {
        self.state.tx.send_replace(true);
        debug!("Cancellation requested");
    }

    /// Wait for cancellation. Returns immediately if already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.state.rx.clone();
        // the sender lives as long as `self`, so this only ends on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
