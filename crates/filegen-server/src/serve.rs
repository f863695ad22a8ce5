//! Server lifecycle: bind, serve, shut down on signal.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::web::{router, AppState};

/// Run the HTTP server until SIGINT or SIGTERM.
pub async fn run(address: &str, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind to {}", address))?;

    info!("filegen-server ready on http://{}", address);
    info!("   Files: GET http://{}/files/{{path}}", address);
    info!("   Hashes: GET http://{}/hashes/{{path}}", address);
    info!("   Objects: GET http://{}/objects/{{hash}}", address);
    info!("   Status: GET http://{}/status", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
