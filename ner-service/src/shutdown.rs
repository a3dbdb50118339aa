//! Termination signal handling.

use tokio::sync::watch;
use tracing::{info, warn};

/// Spawn a task that flips the returned flag to `true` on SIGINT or SIGTERM.
pub fn install_signal_handlers() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!(signal, "Termination signal received, finishing current exchange");
        let _ = tx.send(true);
    });

    rx
}

/// Resolve once shutdown has been requested or the sender is gone.
pub async fn requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                () = ctrl_c() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await;
    "Ctrl-C"
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // No handler: only SIGTERM or a kill can stop the service
        warn!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
