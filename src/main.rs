//! ==============================================================================
//! main.rs - sensor readings service entry point
//! ==============================================================================
//!
//! purpose:
//!     a small http service that records room sensor readings (temperature,
//!     humidity) and serves them back, newest first, from a document store.
//!
//! responsibilities:
//!     - initialize logging
//!     - load configuration once (file + environment) and validate it
//!     - pick the reading store (mongodb, or in-memory for local runs)
//!     - serve the api until ctrl-c / sigterm
//!
//! relationships:
//!     - uses: config.rs (ServiceConfig)
//!     - uses: handlers.rs (router, AppState)
//!     - uses: mongo.rs / store.rs (ReadingStore implementations)
//!
//! architecture:
//!
//!     ┌────────────────────────────────────────────────────────┐
//!     │                  rust service (this file)               │
//!     │   ┌──────────────────┐        ┌─────────────────────┐   │
//!     │   │  POST /api/set   │        │   GET /api/get      │   │
//!     │   └────────┬─────────┘        └──────────┬──────────┘   │
//!     │            └──────────────┬──────────────┘              │
//!     │                    ┌──────┴──────┐                      │
//!     │                    │ ReadingStore│ <- store.rs          │
//!     │                    └──────┬──────┘                      │
//!     └───────────────────────────┼─────────────────────────────┘
//!                                 │ one connection per request
//!                          ┌──────┴──────┐
//!                          │  mongodb /  │
//!                          │  cosmos db  │
//!                          └─────────────┘
//!
//! ==============================================================================

mod config;
mod domain;
mod error;
mod handlers;
mod mongo;
mod store;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::{ServiceConfig, StoreBackend};
use handlers::AppState;
use store::{MemoryStore, ReadingStore};

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let config = ServiceConfig::load_or_default().context("loading configuration")?;

    // RUST_LOG wins over logging.level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    config.log_summary();
    config.validate().context("invalid configuration")?;

    // step 2: pick the store
    let store: Arc<dyn ReadingStore> = match config.store.backend {
        StoreBackend::Mongo => Arc::new(mongo::MongoStore::new(config.database.clone())),
        StoreBackend::Memory => {
            tracing::warn!("[STARTUP] Using in-memory store, readings are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    // step 3: serve
    run_server(&config.server.bind_addr, AppState { store }).await
}

async fn run_server(bind_addr: &str, state: AppState) -> Result<()> {
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    tracing::info!("[STARTUP] ✓ Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("[SHUTDOWN] Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[SHUTDOWN] Cannot listen for ctrl-c: {}", e);
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
                tracing::error!("[SHUTDOWN] Cannot listen for SIGTERM: {}", e);
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
    tracing::info!("[SHUTDOWN] Signal received, draining connections");
}
