//! Cooperative cancellation
//!
//! A [`CancelHandle`] flips a `tokio::sync::watch` flag that every clone of
//! the paired [`CancelSignal`] observes. Waits race [`CancelSignal::cancelled`]
//! against their sleep so cancellation takes effect without waiting out the
//! poll interval.

use std::sync::Arc;

use tokio::sync::watch;

/// Trigger side, held by whoever decides to stop (e.g. a Ctrl+C handler)
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side, passed into long-running waits
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

impl CancelHandle {
    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    ///
    /// Pends forever if the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
        std::future::pending::<()>().await
    }
}
