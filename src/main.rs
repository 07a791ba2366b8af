//! LexHub Server: Real-time collaboration node
//!
//! Loads configuration, connects the distributed store, wires the realtime
//! engine, and serves the WebSocket endpoint until shutdown.

mod auth;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use lexhub_cache::StoreManager;
use lexhub_core::config::AppConfig;
use lexhub_core::error::AppError;
use lexhub_realtime::RealtimeEngine;
use lexhub_realtime::connection::WsAuthenticator;

use crate::auth::JwtResolver;
use crate::ws::AppState;

#[tokio::main]
async fn main() {
    let env = std::env::var("LEXHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting LexHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Distributed store ────────────────────────────────
    tracing::info!(provider = %config.store.provider, "Initializing distributed store...");
    let stores = StoreManager::new(&config.store).await?;

    // ── Step 2: Realtime engine ──────────────────────────────────
    let engine = RealtimeEngine::new(&config, stores.store(), stores.broker())?;
    engine.start().await;

    // ── Step 3: HTTP surface ─────────────────────────────────────
    let resolver = Arc::new(JwtResolver::new(&config.auth));
    let state = AppState {
        engine: engine.clone(),
        authenticator: WsAuthenticator::new(resolver),
        store: stores.store(),
        realtime: config.realtime.clone(),
    };
    let app = ws::build_router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "LexHub server listening");

    // ── Step 4: Graceful shutdown ────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
        })
        .await?;

    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    if tokio::time::timeout(grace, engine.stop()).await.is_err() {
        tracing::warn!(grace_seconds = grace.as_secs(), "Engine shutdown timed out");
    }

    tracing::info!("LexHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
