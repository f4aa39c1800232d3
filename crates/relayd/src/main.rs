//! relayd — the Relay scheduling daemon.
//!
//! Single binary that assembles the scheduling core:
//! - State store (redb)
//! - Scheduling pipeline (find, prioritize, estimate, persist)
//! - Host allocator + spawner over the configured cloud providers
//!
//! # Usage
//!
//! ```text
//! relayd run --config /etc/relay/relayd.toml
//! relayd run --config /etc/relay/relayd.toml --once
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use relay_cloud::{CloudRegistry, MockCloud, StaticCloud};
use relay_scheduler::Scheduler;
use relay_state::StateStore;

use crate::config::RelaydConfig;

#[derive(Parser)]
#[command(name = "relayd", about = "Relay scheduling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduling loop.
    Run {
        /// Path to the daemon configuration file.
        #[arg(long, default_value = "/etc/relay/relayd.toml")]
        config: PathBuf,

        /// Override the configured data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Override the configured pass interval (seconds).
        #[arg(long)]
        pass_interval: Option<u64>,

        /// Run a single scheduling pass and exit.
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relayd=debug,relay=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            pass_interval,
            once,
        } => run(config, data_dir, pass_interval, once).await,
    }
}

async fn run(
    config_path: PathBuf,
    data_dir: Option<PathBuf>,
    pass_interval: Option<u64>,
    once: bool,
) -> anyhow::Result<()> {
    info!(config = ?config_path, "relay daemon starting");

    let mut config = RelaydConfig::from_file(&config_path)?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    if let Some(pass_interval) = pass_interval {
        config.pass_interval_secs = pass_interval;
    }

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join("relay.redb");

    // State store.
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Cloud providers.
    let mut clouds = CloudRegistry::new();
    clouds.register("mock", Arc::new(MockCloud::new()));
    clouds.register(
        "static",
        Arc::new(StaticCloud::new(config.static_pools.clone())),
    );

    // Distro records come from the config file; reseed on every start so
    // edits take effect. A provider key with no manager would fail every
    // pass with UnknownProvider, so refuse it up front.
    for distro_config in &config.distros {
        let distro = distro_config.to_distro();
        anyhow::ensure!(
            clouds.contains(&distro.provider),
            "distro {} uses unknown provider {:?}",
            distro.id,
            distro.provider
        );
        store.put_distro(&distro)?;
        info!(
            distro_id = %distro.id,
            provider = %distro.provider,
            pool_size = distro.pool_size,
            "distro seeded"
        );
    }

    let scheduler = Scheduler::new(store, config.scheduler.clone(), clouds);
    info!("scheduler initialized");

    if once {
        let outcome = scheduler.run_pass().await;
        for err in &outcome.errors {
            error!(error = %err, "pass error");
        }
        info!(hosts_spawned = outcome.total_spawned(), "single pass complete");
        if !outcome.is_healthy() {
            anyhow::bail!("scheduling pass finished with {} errors", outcome.errors.len());
        }
        return Ok(());
    }

    // ── Shutdown signal ────────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Scheduling loop ────────────────────────────────────────────

    let interval = Duration::from_secs(config.pass_interval_secs);
    let loop_handle = tokio::spawn(async move {
        pass_loop(scheduler, interval, shutdown_rx).await;
    });

    // Graceful shutdown on Ctrl-C.
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = loop_handle.await;

    info!("relay daemon stopped");
    Ok(())
}

/// Run scheduling passes on a fixed interval until shutdown.
///
/// A degraded pass is logged and the loop keeps going; the next pass
/// retries whatever was skipped.
async fn pass_loop(
    scheduler: Scheduler,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "scheduling loop started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let outcome = scheduler.run_pass().await;
                for err in &outcome.errors {
                    warn!(error = %err, "pass error");
                }
            }
            _ = shutdown.changed() => {
                info!("scheduling loop shutting down");
                break;
            }
        }
    }
}
