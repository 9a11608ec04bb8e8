//! argusd — the Argus proxy group manager daemon.
//!
//! Single binary that assembles the manager's subsystems:
//! - Monitoring store (redb)
//! - Configuration cache
//! - Diagnostic service
//! - Proxy group manager control loop
//!
//! # Usage
//!
//! ```text
//! argusd run --data-dir /var/lib/argus
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use argus_confcache::ConfCache;
use argus_manager::{GroupManager, ManagerService};

#[derive(Parser)]
#[command(name = "argusd", about = "Argus proxy group manager daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the proxy group manager.
    Run {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/argus")]
        data_dir: PathBuf,

        /// Group sync + status evaluation interval in seconds.
        #[arg(long, default_value = "5")]
        status_interval: u64,

        /// Control loop tick in seconds.
        #[arg(long, default_value = "1")]
        tick_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,argusd=debug,argus=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            data_dir,
            status_interval,
            tick_interval,
        } => run(data_dir, status_interval, tick_interval).await,
    }
}

async fn run(data_dir: PathBuf, status_interval: u64, tick_interval: u64) -> anyhow::Result<()> {
    info!("Argus proxy group manager starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("argus.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = argus_store::MonitorStore::open(&db_path)?;
    info!(path = ?db_path, "monitoring store opened");

    let confcache = Arc::new(ConfCache::new());

    let manager = GroupManager::with_intervals(
        store,
        confcache,
        Duration::from_secs(status_interval),
        Duration::from_secs(tick_interval),
    )?;
    info!(status_interval, "proxy group manager initialized");

    // The service handle is the one fatal startup case.
    let (_service, service_task) = match ManagerService::init(manager.cache()) {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "cannot start proxy group manager service");
            std::process::exit(1);
        }
    };

    manager.bootstrap().await?;
    info!("cache bootstrapped");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Run the control loop ───────────────────────────────────

    let manager_handle = tokio::spawn(async move {
        manager.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    manager_handle.await?;
    service_task.abort();

    info!("Argus proxy group manager stopped");
    Ok(())
}
