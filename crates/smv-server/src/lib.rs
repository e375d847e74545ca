//! smv-server: HTTP surface for the spedup-mv orchestrator.
//!
//! Submission, status polling, cancellation, capability reporting and
//! artifact download over Axum. Jobs run on the pipeline's background
//! worker; handlers only submit and observe.

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

use std::net::SocketAddr;

use smv_core::config::Config;

use crate::context::AppContext;

/// Start the HTTP server and serve until a shutdown signal arrives.
pub async fn start(config: Config) -> smv_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| smv_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::initialize(config).await?;
    serve(ctx, addr).await
}

/// Serve an already built context on `addr`.
pub async fn serve(ctx: AppContext, addr: SocketAddr) -> smv_core::Result<()> {
    let app = router::build_router(ctx.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| smv_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| smv_core::Error::Internal(format!("Server error: {e}")))?;

    if let Some(job_id) = ctx.executor.registry().cancel() {
        tracing::info!(job_id = %job_id, "running job asked to stop at its next stage boundary");
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
