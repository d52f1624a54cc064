use tracing::{error, info};

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C."),
                    _ = term.recv() => info!("Received SIGTERM."),
                }
                return;
            }
            Err(e) => error!(
                error = %e,
                "Could not install SIGTERM handler, listening for Ctrl-C only."
            ),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl-C.");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C.");
}
