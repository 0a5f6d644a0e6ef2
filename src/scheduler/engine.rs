use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::probes::ConnectivityProbe;
use crate::speedtest::{self, SpeedTestProvider};
use crate::storage::{ConnectionTestRecord, ResultStore, SpeedTestRecord, StorageError};

/// Probe reachability once and record the result if the probe failed.
///
/// Returns the id of the inserted row, or `None` when the link was up and
/// nothing was written.
pub async fn log_connection_status(
    probe: &dyn ConnectivityProbe,
    store: &dyn ResultStore,
) -> Result<Option<i64>, StorageError> {
    let report = probe.check().await;

    match &report.outcome {
        Ok(latency) => {
            debug!(latency_ms = latency.as_secs_f64() * 1000.0, "Connectivity check passed");
            Ok(None)
        }
        Err(reason) => {
            warn!(started_at = %report.started_at, %reason, "Connectivity check failed");
            let record = ConnectionTestRecord::from_report(&report);
            let id = store.log_connection_test(&record).await?;
            Ok(Some(id))
        }
    }
}

/// Run one speed test and record it, success or not.
pub async fn log_speed_test(
    provider: &dyn SpeedTestProvider,
    store: &dyn ResultStore,
) -> Result<i64, StorageError> {
    let report = speedtest::measure(provider).await;

    if let Err(reason) = &report.outcome {
        warn!(
            provider = provider.meta().id,
            %reason,
            "Speed test failed; recording zero throughput"
        );
    }

    let record = SpeedTestRecord::from_report(&report);
    let id = store.log_speed_test(&record).await?;

    info!(
        id,
        download_mbps = record.download_mbps,
        upload_mbps = record.upload_mbps,
        ping_ms = ?record.ping_ms,
        "Speed test recorded"
    );
    Ok(id)
}

/// Check connectivity, sleep `interval`, repeat. Only a storage error ends it.
pub async fn run_connectivity_loop(
    probe: Arc<dyn ConnectivityProbe>,
    store: Arc<dyn ResultStore>,
    interval: Duration,
) -> Result<(), StorageError> {
    info!(interval_secs = interval.as_secs_f64(), "Connectivity loop started");

    loop {
        log_connection_status(probe.as_ref(), store.as_ref()).await?;
        tokio::time::sleep(interval).await;
    }
}

/// Run a speed test, sleep `interval`, repeat. Only a storage error ends it.
pub async fn run_speed_loop(
    provider: Arc<dyn SpeedTestProvider>,
    store: Arc<dyn ResultStore>,
    interval: Duration,
) -> Result<(), StorageError> {
    info!(
        provider = provider.meta().id,
        interval_secs = interval.as_secs_f64(),
        "Speed test loop started"
    );

    loop {
        log_speed_test(provider.as_ref(), store.as_ref()).await?;
        tokio::time::sleep(interval).await;
    }
}
