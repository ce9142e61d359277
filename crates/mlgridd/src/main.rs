//! mlgridd — the mlgrid daemon.
//!
//! Single binary that assembles the whole control plane:
//! - Model registry (redb)
//! - Claim table + host tracker
//! - Scheduler
//! - Compute manager for the local host
//! - Deployment state machine with provisioner polling
//!
//! # Usage
//!
//! ```text
//! mlgridd run --data-dir /var/lib/mlgrid --config /etc/mlgrid.toml
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use mlgrid_compute::{ComputeApi, DriverKind, load_driver, spawn_manager};
use mlgrid_core::Resources;
use mlgrid_core::config::MlgridConfig;
use mlgrid_deploy::provisioner::default_template;
use mlgrid_deploy::{Deployer, HttpProvisioner};
use mlgrid_registry::Registry;
use mlgrid_scheduler::Scheduler;
use mlgrid_tracker::{ClaimTable, HostTracker};

#[derive(Parser)]
#[command(name = "mlgridd", about = "mlgrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane (registry, scheduler, compute, deployer).
    Run {
        /// Path to mlgrid.toml; defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/mlgrid")]
        data_dir: PathBuf,

        /// Override the hostname this compute service registers under.
        #[arg(long)]
        host: Option<String>,

        /// Override the driver kind ("tensorflow", "noop").
        #[arg(long)]
        driver: Option<String>,

        /// CPU cores the local driver may hand out.
        #[arg(long, default_value = "4")]
        cpu: u32,

        /// Memory in MiB the local driver may hand out.
        #[arg(long, default_value = "8192")]
        memory_mb: u64,

        /// Disk in GiB the local driver may hand out.
        #[arg(long, default_value = "100")]
        disk_gb: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mlgridd=debug,mlgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            host,
            driver,
            cpu,
            memory_mb,
            disk_gb,
        } => {
            let mut config = match config {
                Some(path) => MlgridConfig::from_file(&path)?,
                None => MlgridConfig::default(),
            };
            if let Some(host) = host {
                config.compute.host = host;
            }
            if let Some(driver) = driver {
                config.compute.driver = driver;
            }
            run(config, data_dir, Resources::new(cpu, memory_mb, disk_gb)).await
        }
    }
}

async fn run(config: MlgridConfig, data_dir: PathBuf, capacity: Resources) -> anyhow::Result<()> {
    info!("mlgrid daemon starting");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("mlgrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let registry = Registry::open(&db_path)?;
    info!(path = ?db_path, "model registry opened");

    let claims = ClaimTable::new(registry.clone());
    let scheduler = Scheduler::new(registry.clone(), claims.clone());
    info!("scheduler initialized");

    let kind = DriverKind::from_str(&config.compute.driver)?;
    let driver = load_driver(kind, capacity);
    info!(host = %config.compute.host, driver = %kind, "driver loaded");

    let tracker = HostTracker::new(
        &config.compute.host,
        driver.clone(),
        registry.clone(),
        claims.clone(),
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Compute manager for the local host ─────────────────────

    let compute = ComputeApi::new();
    let (manager_tx, manager_handle) =
        spawn_manager(&config.compute.host, driver, shutdown_rx.clone());
    compute.register_host(&config.compute.host, manager_tx).await;

    // ── Deployer ───────────────────────────────────────────────

    let provisioner = Arc::new(HttpProvisioner::new(&config.provisioner.endpoint)?);
    let deployer = Deployer::new(
        registry.clone(),
        scheduler,
        claims,
        compute.clone(),
        provisioner,
        config.deploy.clone(),
        config.provisioner.stack_name.clone(),
        default_template(),
    );
    info!(endpoint = %config.provisioner.endpoint, "deployer initialized");

    // Settle anything a previous process left mid-deployment.
    let recovered = deployer.recover().await?;
    if recovered > 0 {
        warn!(recovered, "interrupted deployments settled");
    }

    // ── Inventory loop ─────────────────────────────────────────

    let inventory_interval =
        std::time::Duration::from_secs(config.compute.inventory_interval.max(1));
    let mut inventory_shutdown = shutdown_rx.clone();
    let inventory_handle = tokio::spawn(async move {
        // Eager first pass registers the host before anything schedules.
        if let Err(e) = tracker.update_available_resources().await {
            warn!(error = %e, "initial inventory pass failed");
        }
        let mut ticker = tokio::time::interval(inventory_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = tracker.update_available_resources().await {
                        warn!(error = %e, "inventory pass failed");
                    }
                }
                _ = inventory_shutdown.changed() => break,
            }
        }
    });

    // ── Wait for shutdown ──────────────────────────────────────

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    deployer.shutdown().await;
    let _ = inventory_handle.await;
    let _ = manager_handle.await;

    info!("mlgrid daemon stopped");
    Ok(())
}
