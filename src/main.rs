//! Permit Relayer - gasless ERC-20 transfers via EIP-2612 permits
//!
//! Accepts a user's signed `permit` calldata, submits it from a fee-paying
//! signer and then pulls the tokens with `transferFrom` from the spender
//! signer, returning both receipts.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod codec;
mod config;
mod error;
mod metrics;
mod relay;
mod store;
mod tx;

use chain::ChainRegistry;
use config::Settings;
use metrics::MetricsServer;
use relay::RelayExecutor;
use store::{InMemoryTaskStore, PgTaskStore, TaskStore};
use tx::{EthersSubmitter, RelaySigners};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Permit Relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    let registry = Arc::new(ChainRegistry::from_settings(&settings)?);

    // Signers are injected here, never read from globals
    let signers = RelaySigners::from_env(&settings.wallet)?;
    let submitter = Arc::new(EthersSubmitter::new(
        &registry,
        signers,
        settings.relay.clone(),
    )?);
    info!("Chain connections initialized");

    let store: Arc<dyn TaskStore> = if settings.database.enabled {
        let pg = PgTaskStore::new(&settings.database).await?;
        info!("Database connection established");
        pg.run_migrations().await?;
        Arc::new(pg)
    } else {
        warn!("Database disabled, relay tasks are kept in memory only");
        Arc::new(InMemoryTaskStore::new())
    };

    let executor = Arc::new(RelayExecutor::new(registry, submitter, store.clone()));

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.server.clone();
        let executor = executor.clone();
        async move {
            if let Err(e) = api::run_server(config, executor).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    if let Err(e) = store.health_check().await {
        warn!("Task store health check failed: {}", e);
    }

    info!("Permit Relayer is running");
    info!(
        "API server: http://{}:{}",
        settings.server.host, settings.server.port
    );
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Permit Relayer stopped");
    Ok(())
}

/// `RUST_LOG` filters; `RELAYER_LOG_JSON=1` switches to JSON lines
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,permit_relayer=debug,sqlx=warn,hyper=warn")
    });

    let json = std::env::var("RELAYER_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
