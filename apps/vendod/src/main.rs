//! # vendod
//!
//! Ledger daemon: opens the shop database, makes sure every catalog pool
//! exists, and runs the expiry sweeper until asked to stop.
//!
//! ## Startup
//! ```text
//! ShopConfig::load (defaults → vendo.toml → VENDO_*)
//!     │
//!     ▼
//! Database::new (migrations) ──► EngineBuilder::build ──► register_pools
//!     │
//!     ▼
//! spawn ExpirySweeper::run ──► wait for ctrl-c / SIGTERM ──► shutdown, close pool
//! ```
//!
//! ## Environment
//! - `VENDO_CONFIG`: path of the TOML config file
//! - `RUST_LOG`: log filter, default `info,vendo=debug,sqlx=warn`

use std::path::PathBuf;

use anyhow::Context as _;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vendo_db::{Database, DbConfig};
use vendo_engine::{EngineBuilder, ShopConfig};

const DEFAULT_LOG_FILTER: &str = "info,vendo=debug,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting vendod");

    let config_path = std::env::var_os("VENDO_CONFIG").map(PathBuf::from);
    let config = ShopConfig::load(config_path).context("loading shop config")?;

    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;

    let engine = EngineBuilder::new(config)
        .with_database(db.clone())
        .build()
        .context("building engine")?;
    engine.register_pools().await.context("registering pools")?;

    for pool in engine.inventory().pools().await? {
        info!(pool = %pool.name, size = pool.size, shown = pool.display_count, "Pool");
    }
    let pending = engine.orders().pending().await?.len();
    let revenue = db.orders().completed_revenue().await?;
    let outstanding = db.balances().total_outstanding().await?;
    info!(pending, %revenue, %outstanding, "Ledger loaded");

    let (sweeper, sweeper_handle) = engine.sweeper();
    let sweeper_task = tokio::spawn(sweeper.run());

    shutdown_signal().await;

    if let Err(e) = sweeper_handle.shutdown().await {
        warn!(?e, "Sweeper already stopped");
    }
    if let Err(e) = sweeper_task.await {
        warn!(?e, "Sweeper task ended abnormally");
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for ctrl-c");
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
                warn!(?e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, stopping...");
}
