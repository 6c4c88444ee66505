//! Process entry point (spec §5, §6): loads `AppConfig` and the connector
//! registry, wires up the Scheduler and ConfigurationUpdateManager, and
//! blocks until a Ctrl-C drain completes.

mod tracing_init;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pyplyn::clock::ShutdownSignal;
use pyplyn::cluster::{Cluster, LocalCluster};
use pyplyn::config::{load_connectors, AppConfig, StaticConfigurationLoader};
use pyplyn::{Pipeline, TaskScheduler, UpdateManager};
use tracing::info;

/// Scalable time-series ETL service.
#[derive(Parser, Debug)]
#[command(name = "pyplyn", version)]
struct Cli {
    /// Path to the application config file (TOML).
    #[arg(long, default_value = "pyplyn.toml")]
    config: PathBuf,

    /// Path to the connector registry file (JSON). Overrides
    /// `global.connectors_path` from the config file when set.
    #[arg(long)]
    connectors: Option<PathBuf>,
}

const WORKER_POOL_SIZE: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init::init();

    let cli = Cli::parse();

    let app_config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let connectors_path = cli
        .connectors
        .unwrap_or_else(|| PathBuf::from(&app_config.global.connectors_path));
    let connector_registry = load_connectors(&connectors_path).with_context(|| {
        format!("failed to load connectors from {}", connectors_path.display())
    })?;

    let shutdown = ShutdownSignal::new();
    let status = pyplyn::status::SystemStatus::new();
    let connectors = Arc::new(pyplyn::app_connectors::AppConnectors::new(
        connector_registry,
    ));
    let pipeline = Pipeline::new(connectors, shutdown.clone(), status);
    let cluster: Arc<dyn Cluster> = Arc::new(LocalCluster::new());
    let loader = Arc::new(StaticConfigurationLoader::new(
        app_config.global.configurations_path.clone(),
    ));

    if app_config.global.run_once {
        return run_once(loader, &pipeline).await;
    }

    let scheduler = Arc::new(TaskScheduler::new(pipeline, shutdown.clone(), WORKER_POOL_SIZE));
    let update_manager = UpdateManager::new(cluster, loader, scheduler.clone());

    let ctrlc_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, draining");
            ctrlc_shutdown.begin_drain();
        }
    });

    let reload_interval =
        Duration::from_millis(app_config.global.update_configuration_interval_millis.max(1) as u64);
    let mut ticker = tokio::time::interval(reload_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if shutdown.is_draining() {
            break;
        }
        update_manager.run().await;
    }

    scheduler.cancel_all();
    info!("shutdown complete");
    Ok(())
}

async fn run_once(loader: Arc<StaticConfigurationLoader>, pipeline: &Pipeline) -> Result<()> {
    use pyplyn::ConfigurationLoader;

    let configurations = loader
        .load()
        .await
        .context("failed to load configurations for single run")?;

    for configuration in &configurations {
        pipeline
            .run(configuration, &pyplyn::clock::CancellationFlag::new())
            .await;
    }
    Ok(())
}
