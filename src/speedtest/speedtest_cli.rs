use super::{client_responds, run_client, ProviderMeta, SpeedMeasurement, SpeedTestProvider};
use crate::probes::ProbeError;
use serde::Deserialize;

/// Community `speedtest-cli` client. Picks the lowest-latency server itself
/// and reports rates already in bits per second.
pub struct SpeedtestCliProvider {
    binary: String,
}

impl Default for SpeedtestCliProvider {
    fn default() -> Self {
        Self::with_binary("speedtest-cli")
    }
}

impl SpeedtestCliProvider {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl SpeedTestProvider for SpeedtestCliProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: "speedtest-cli",
            display_name: "speedtest-cli (Speedtest.net servers)",
            install_hint: "Install with `pip install speedtest-cli` or your distribution's package",
        }
    }

    async fn is_available(&self) -> bool {
        client_responds(&self.binary).await
    }

    async fn run(&self) -> Result<SpeedMeasurement, ProbeError> {
        let stdout = run_client(&self.binary, &["--json", "--secure"]).await?;
        parse_output(&String::from_utf8_lossy(&stdout))
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    download: f64,
    upload: f64,
    ping: Option<f64>,
}

pub fn parse_output(stdout: &str) -> Result<SpeedMeasurement, ProbeError> {
    let report: Report =
        serde_json::from_str(stdout.trim()).map_err(|e| ProbeError::Parse(e.to_string()))?;
    SpeedMeasurement::new(report.download, report.upload, report.ping)
}
