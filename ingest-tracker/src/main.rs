//! ingest-tracker - execution tracking service
//!
//! Serves dataset submission, progress snapshots and bias-detection requests
//! over HTTP. Every instance pointed at the same database file shares one
//! ledger, one set of dataset locks and one set of rate buckets.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ingest_tracker::config::TrackerConfig;
use ingest_tracker::services::{
    DebiasGuard, HttpSideWorkflow, LockService, ProgressAggregator, RateGate, SideWorkflow,
    SqliteLockService,
};
use ingest_tracker::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "ingest-tracker", version, about = "Ingestion execution tracker")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "INGEST_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the shared database
    #[arg(long, env = "INGEST_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides [server] bind_address
    #[arg(long, env = "INGEST_TRACKER_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| ingest_common::config::default_config_path("ingest-tracker"))
        .context("No configuration directory on this platform; pass --config")?;
    let config = TrackerConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting ingest-tracker v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = ingest_common::config::resolve_root_folder(
        args.root_folder.as_deref(),
        "INGEST_ROOT_FOLDER",
        config.root_folder.as_deref(),
    );
    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let pool = ingest_tracker::db::init_database_pool(&db_path, config.database.pool_settings())
        .await
        .context("Failed to open the shared database")?;

    let aggregator = ProgressAggregator::new(pool.clone(), config.portal.clone());

    let locks: Arc<dyn LockService> = Arc::new(SqliteLockService::new(
        pool.clone(),
        Duration::from_millis(config.debias.lock_lease_ms),
    ));
    let workflow: Option<Arc<dyn SideWorkflow>> = match config.debias.service_url.as_deref() {
        Some(url) => {
            info!("Bias detection service: {}", url);
            let workflow: Arc<dyn SideWorkflow> = Arc::new(HttpSideWorkflow::new(
                url,
                Duration::from_secs(config.debias.request_timeout_secs),
            )?);
            Some(workflow)
        }
        None => {
            info!("No bias detection service configured; start requests will be refused");
            None
        }
    };
    let debias = DebiasGuard::new(
        pool.clone(),
        aggregator.clone(),
        locks,
        workflow,
        Duration::from_millis(config.debias.lock_wait_ms),
    );

    let rate_gate = if config.rate_limit.enabled {
        info!(
            capacity = config.rate_limit.capacity,
            refill_seconds = config.rate_limit.refill_seconds,
            "Rate limiting enabled"
        );
        Some(RateGate::new(
            pool.clone(),
            config.rate_limit.capacity,
            config.rate_limit.refill_interval(),
        ))
    } else {
        None
    };

    let state = AppState::new(pool, aggregator, debias, rate_gate);
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.server.bind_address);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
