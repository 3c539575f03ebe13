//! appcache daemon
//!
//! Serves the cache over HTTP and runs the maintenance tasks.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appcache::api::create_router;
use appcache::{spawn_gc_task, spawn_persist_task, AppState, Config};

/// Main entry point for the cache daemon.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Load persisted settings and build the store
/// 4. Restore the cache directory from its archive
/// 5. Start GC (when an owner registry is configured) and persist tasks
/// 6. Serve HTTP until SIGINT/SIGTERM, then write a final archive
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "appcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting appcache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: data_dir={}, port={}, gc_interval={}s, persist_interval={}s",
        config.data_dir.display(),
        config.server_port,
        config.gc_interval,
        config.persist_interval
    );

    let state = AppState::from_config(&config).context("failed to load cache settings")?;
    info!(
        "Cache store initialized, configured engine: {}",
        state.store.selector().configured_engine()
    );

    if config.restore_on_start {
        let bridge = state.bridge.clone();
        match tokio::task::spawn_blocking(move || bridge.restore()).await? {
            Ok(true) => info!("Cache restored from {}", config.archive_path.display()),
            Ok(false) => info!("Starting with an empty cache"),
            Err(e) => warn!("Cache restore failed, starting empty: {}", e),
        }
    }

    let mut handles = vec![spawn_persist_task(state.bridge.clone(), config.persist_interval)];
    match &state.owners_path {
        Some(path) => {
            handles.push(spawn_gc_task(state.gc.clone(), path.clone(), config.gc_interval));
            info!("GC task started with registry {}", path.display());
        }
        None => warn!("APPCACHE_OWNERS not set, garbage collection disabled"),
    }

    let bridge = state.bridge.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(handles))
        .await
        .context("server error")?;

    match tokio::task::spawn_blocking(move || bridge.persist()).await? {
        Ok(_) => info!("Final cache archive written"),
        Err(e) => warn!("Final cache archive failed: {}", e),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the
/// maintenance tasks.
async fn shutdown_signal(handles: Vec<tokio::task::JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in handles {
        handle.abort();
    }
    warn!("Maintenance tasks aborted");
}
