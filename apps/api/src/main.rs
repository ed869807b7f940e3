//! # SGIR API Server
//!
//! ## Startup
//! ```text
//! .env ──► ApiConfig ──► tracing ──► Database (migrations) ──► AppState
//!                                                                 │
//!                           axum::serve ◄── app(state) ◄──────────┘
//!                               │
//!                       Ctrl+C / SIGTERM ──► graceful shutdown
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sgir_api::gate::SystemClock;
use sgir_api::{app, ApiConfig, AppState};
use sgir_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    dotenvy::dotenv().ok();

    let config = ApiConfig::load().context("Failed to load configuration")?;

    let default_level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sgir_api={default_level},sgir_db={default_level},tower_http=info")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting SGIR API server...");
    if config.uses_dev_secret() {
        warn!("SGIR_SECRET_KEY not set, using the development key");
    }
    if config.webhook_api_key.is_none() {
        info!("SGIR_WEBHOOK_API_KEY not set, integrations façade rejects every call");
    }
    info!(
        port = config.http_port,
        database = %config.database_path.display(),
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(config.database_path.clone()))
        .await
        .context("Failed to open database")?;
    info!("Database ready");

    let port = config.http_port;
    let state = Arc::new(AppState::new(config, db, Arc::new(SystemClock))?);
    let router = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
