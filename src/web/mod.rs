//! Web server and HTTP API for the appliance.
//!
//! A small REST surface over the shared state, the settings store, and the
//! network adapter, plus a built-in status page. The server runs in the
//! foreground and drains on SIGINT/SIGTERM so the caller can stop the
//! runtime loops afterwards.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use handlers::ApiContext;
pub use router::create_app;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::error::{Result, SentryError};

/// Start the web server and block until a shutdown signal arrives.
pub async fn start_web_server(config: WebConfig, ctx: Arc<ApiContext>) -> Result<()> {
    let app = create_app(&config, ctx);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| SentryError::config_error(format!("invalid bind address: {}", e)))?;

    info!("starting web server on http://{}", addr);
    info!("dashboard available at http://{}/", addr);
    info!("API endpoint: http://{}/api/stats", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SentryError::web_server_error(format!("failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SentryError::web_server_error(format!("server error: {}", e)))?;

    Ok(())
}

/// Completes when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::warn;

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
