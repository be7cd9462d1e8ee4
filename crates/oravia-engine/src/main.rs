//! Scheduler process for the Oravia simulation kernel.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `oravia-config.yaml` (or `ORAVIA_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the configured store backend
//! 4. Contend for the scheduler lease and run the poll loop
//! 5. On Ctrl-C, finish the current tick, release the lease, and exit

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use oravia_core::{KernelConfig, Lease, RunnerControl, Scheduler, StoreBackend, run_scheduler};
use oravia_store::{DragonflyStore, MemoryStore, Store};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "oravia-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the store cannot be
/// reached.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, from_file) = load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("oravia-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        speed_multiplier = config.rules.speed_multiplier,
        map_size = config.world.map_size,
        poll_interval_ms = config.scheduler.poll_interval_ms,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    let config = Arc::new(config);
    let attempts = config.store.max_transaction_attempts;
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Memory backend selected: state lives only as long as this process");
            serve(MemoryStore::new(attempts), config).await;
        }
        StoreBackend::Dragonfly => {
            info!(url = %config.store.dragonfly_url, "Connecting to Dragonfly");
            let store = DragonflyStore::connect(&config.store.dragonfly_url, attempts)
                .await
                .map_err(EngineError::from)?;
            serve(store, config).await;
        }
    }

    info!("oravia-engine stopped");
    Ok(())
}

/// Run the scheduler loop over `store` until Ctrl-C.
async fn serve<S: Store>(store: S, config: Arc<KernelConfig>) {
    let instance = config
        .scheduler
        .instance_id
        .clone()
        .unwrap_or_else(|| format!("oravia-{}", uuid::Uuid::now_v7()));

    let scheduler = Scheduler::new(store.clone(), Arc::clone(&config));
    let lease = Lease::new(store, instance, config.scheduler.lease_ttl_ms);
    let control = Arc::new(RunnerControl::new());

    let stopper = Arc::clone(&control);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                stopper.request_stop();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let summary = run_scheduler(&scheduler, &lease, &control, config.scheduler.poll_interval_ms).await;
    info!(
        ticks = summary.ticks,
        attacks = summary.attacks,
        returns = summary.returns,
        failures = summary.failures,
        "Scheduler finished"
    );
}

/// Load configuration from `ORAVIA_CONFIG` or `oravia-config.yaml`.
///
/// Returns the config and whether it came from a file. A missing file
/// yields the defaults.
fn load_config() -> Result<(KernelConfig, bool), EngineError> {
    let config_path = std::env::var("ORAVIA_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if config_path.exists() {
        Ok((KernelConfig::from_file(&config_path)?, true))
    } else {
        let mut config = KernelConfig::default();
        config.store.apply_env_overrides();
        Ok((config, false))
    }
}
