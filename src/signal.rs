//! Process-wide flag raised when the dispatcher dies.

use std::sync::Arc;

use tokio::sync::watch;

/// One-way unset → set flag shared between the dispatcher and its observers.
///
/// Cloning yields another handle to the same flag. Setting is idempotent:
/// only the first [`set`](ErrorSignal::set) reports a transition.
#[derive(Debug, Clone)]
pub struct ErrorSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ErrorSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the flag. Returns `true` if this call changed it.
    pub fn set(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the flag is raised. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}
