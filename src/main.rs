//! memlite - minimal memcached-compatible cache server
//!
//! Keeps every entry in memory; nothing is persisted.

// Use jemalloc for better multi-threaded performance
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use anyhow::Context;
use memlite::config::Config;
use memlite::health::HealthServer;
use memlite::metrics::Metrics;
use memlite::server::Server;
use memlite::storage::Store;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting memlite");

    // Load configuration
    let config = if let Some(config_path) = std::env::args().nth(1) {
        info!("Loading configuration from {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Using default configuration (set MEMLITE_* env vars to customize)");
        Config::from_env()?
    };

    info!("Configuration: {:?}", config);

    // Build tokio runtime with configured worker threads
    let mut runtime_builder = Builder::new_multi_thread();
    if config.server.worker_threads > 0 {
        runtime_builder.worker_threads(config.server.worker_threads);
        info!("Using {} worker threads", config.server.worker_threads);
    } else {
        info!("Using default worker threads (auto-detected)");
    }
    let runtime = runtime_builder.enable_all().build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let store = Arc::new(Store::new());
    let metrics = Arc::new(Metrics::new());

    // Binding the cache port is the one fatal startup step
    let listener = TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;

    // Health/metrics endpoint is optional; failing to bind it is not fatal
    let health_server = if config.metrics.enabled {
        match TcpListener::bind(&config.metrics.listen_addr).await {
            Ok(health_listener) => {
                let health = Arc::new(HealthServer::new(Arc::clone(&metrics)));
                tokio::spawn(Arc::clone(&health).serve(health_listener, cancel_token.clone()));
                Some(health)
            }
            Err(e) => {
                error!(
                    "Health server disabled, failed to bind {}: {}",
                    config.metrics.listen_addr, e
                );
                None
            }
        }
    } else {
        None
    };

    let server = Arc::new(Server::new(
        config.server.clone(),
        Arc::clone(&store),
        Arc::clone(&metrics),
        config.storage.zero_exptime,
        cancel_token.clone(),
    ));

    // Mark as ready after initialization
    if let Some(ref health) = health_server {
        health.set_ready(true);
        info!("Server is ready");
    }

    // Setup signal handlers
    let cancel_for_signal = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
            }
            _ = terminate_signal() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
        cancel_for_signal.cancel();
    });

    // Run the main server
    if let Err(e) = server.serve(listener).await {
        error!("Server error: {}", e);
    }

    if let Some(health) = health_server {
        health.set_ready(false);
    }

    info!(keys = store.len(), "memlite stopped");
    Ok(())
}

/// Resolves on SIGTERM; never on platforms without it
async fn terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
