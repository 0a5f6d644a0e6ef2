//! linkwatch -- unattended internet connectivity and bandwidth logger.
//!
//! Two independent loops share one relational store: a 1 second HTTP
//! reachability check that records outages, and a 60 second speed test that
//! records every run.

pub mod config;
pub mod probes;
pub mod scheduler;
pub mod speedtest;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::probes::HttpProbe;
use crate::scheduler::{LoopKind, Supervisor};

/// Start the daemon: connect the store, create the schema, then run both
/// loops until a shutdown signal arrives or every loop has died.
pub async fn run(config: MonitorConfig) -> Result<()> {
    // 1. Storage. Fails before any loop starts.
    let store = storage::connect(config.database)
        .await
        .context("failed to open the result store")?;
    store
        .ensure_schema()
        .await
        .context("failed to create the database schema")?;
    info!("Database schema ready");

    // 2. Probes
    let probe =
        HttpProbe::new(&config.connectivity).context("failed to build the HTTP client")?;
    info!(
        url = probe.url(),
        timeout = ?config.connectivity.timeout,
        "Connectivity check ready"
    );

    let provider: Arc<dyn speedtest::SpeedTestProvider> =
        Arc::from(speedtest::provider_for(config.speed.provider));
    let meta = provider.meta();
    info!(provider = meta.id, name = meta.display_name, "Speed-test provider selected");
    if !provider.is_available().await {
        warn!(
            provider = meta.id,
            name = meta.display_name,
            hint = meta.install_hint,
            "Speed-test client not found; speed tests will be recorded as failures"
        );
    }

    // 3. Loops
    let mut supervisor = Supervisor::new();
    supervisor.spawn(
        LoopKind::Connectivity,
        scheduler::run_connectivity_loop(
            Arc::new(probe),
            store.clone(),
            config.connectivity.interval,
        ),
    );
    supervisor.spawn(
        LoopKind::Speed,
        scheduler::run_speed_loop(provider, store, config.speed.interval),
    );

    let exits = tokio::select! {
        exits = supervisor.wait() => Some(exits),
        _ = shutdown_signal() => None,
    };

    match exits {
        Some(exits) => anyhow::bail!("all {} monitoring loops have terminated", exits.len()),
        None => {
            info!("Shutdown signal received, stopping loops");
            supervisor.shutdown().await;
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SIGTERM");
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
