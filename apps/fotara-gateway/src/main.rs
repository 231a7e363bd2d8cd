//! # Fotara Gateway
//!
//! HTTP server in front of the submission pipeline.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Gateway Server                                 │
//! │                                                                         │
//! │  Host ───► HTTP (8080) ───► Orchestrator ───► PostgreSQL               │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │                          Government endpoint                            │
//! │                                                                         │
//! │  RedriveWorker (optional) ───► Orchestrator                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::Secret;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fotara_db::{Database, DbConfig, FiscalStore, MemoryStore};
use fotara_gateway::{build_router, AppState};
use fotara_submit::{
    HttpTransport, RedriveWorker, StorageBackend, SubmissionOrchestrator, SubmitConfig,
    SubmitError,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fotara=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    info!("Starting Fotara gateway...");

    // Load configuration
    let config = SubmitConfig::load(std::env::args().nth(1).map(PathBuf::from))?;
    info!(
        endpoint = %config.endpoint.url,
        port = config.server.port,
        redrive = config.redrive.enabled,
        "Configuration loaded"
    );

    // Storage
    let store: Arc<dyn FiscalStore> = match config.database.storage {
        StorageBackend::Postgres => {
            let url = config.database.url.clone().ok_or_else(|| {
                SubmitError::InvalidConfig("database.url is required".into())
            })?;
            let db = Database::new(
                DbConfig::new(Secret::new(url)).max_connections(config.database.max_connections),
            )
            .await?;
            info!("Connected to PostgreSQL");
            Arc::new(db)
        }
        StorageBackend::Memory => {
            warn!("In-memory storage: issued identities and counters are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let transport = HttpTransport::from_settings(&config.endpoint)?;
    let orchestrator = Arc::new(SubmissionOrchestrator::from_config(
        store,
        Arc::new(transport),
        &config,
    ));

    // Background redrive
    let redrive = if config.redrive.enabled {
        let (worker, handle) = RedriveWorker::new(orchestrator.clone(), config.redrive.clone());
        tokio::spawn(worker.run());
        Some(handle)
    } else {
        None
    };

    let app = build_router(AppState::new(orchestrator));

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = redrive {
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Redrive worker did not acknowledge shutdown");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
