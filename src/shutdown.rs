use std::sync::Arc;

use tokio::signal;

use crate::server::AppState;
use crate::workflow::Orchestrator;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Shutdown future for `axum::serve`: resolves on a signal, after noting any
/// submission still running. The server then drains in-flight requests.
pub async fn shutdown_signal(state: Arc<AppState>) {
    wait_for_shutdown().await;
    tracing::info!("Starting graceful shutdown...");
    report_in_flight(&state.orchestrator);
}

/// Log whether a run is in progress; returns `true` if one is.
///
/// Nothing can be rolled back from here: a stage request already sent may
/// still create its branch or pull request on the remote side.
pub fn report_in_flight(orchestrator: &Orchestrator) -> bool {
    if orchestrator.is_busy() {
        tracing::warn!(
            "A submission is still running; waiting for it, but a client that disconnects abandons it mid-stage"
        );
        true
    } else {
        tracing::info!("No submission in flight");
        false
    }
}
