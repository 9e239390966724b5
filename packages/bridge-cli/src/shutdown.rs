//! Ctrl+C / SIGTERM handling
//!
//! The first signal cancels the running flow. Polling and balance watching
//! stop at their next suspension point; a transaction that is already being
//! sent is still waited for, up to `INCLUSION_TIMEOUT_MS`, so its handle can
//! be checkpointed. A second signal exits at once with status 130.

use std::future::Future;

use crossdomain_rs::CancelHandle;
use tracing::{info, warn};

/// Exit status for an interrupted run
pub const INTERRUPTED: u8 = 130;

/// Cancel `handle` once `signal` completes
pub async fn cancel_on(signal: impl Future<Output = ()>, handle: CancelHandle) {
    signal.await;
    warn!(
        "Cancelling: polling stops now; a pending submission or finalization is \
         waited for until it is included. Press Ctrl+C again to exit immediately"
    );
    handle.cancel();
}

/// Cancel on the first signal, exit on the second
pub async fn handle_signals(handle: CancelHandle) {
    cancel_on(wait_for_shutdown_signal(), handle).await;
    wait_for_shutdown_signal().await;
    warn!("Second signal received, exiting without waiting");
    std::process::exit(i32::from(INTERRUPTED));
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
pub async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
