//! Shutdown signal handling.
//!
//! Ctrl+C and SIGTERM cancel a token instead of killing the process, so an
//! in-progress wait can stop cleanly and optionally cancel the remote job.

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process receives SIGINT or SIGTERM
pub fn cancel_on_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        token.cancel();
    });
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

/// Resolves on Ctrl+C. Never resolves if the handler can't be installed.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
