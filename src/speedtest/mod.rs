//! Bandwidth measurement through an external speed-test client.
//!
//! Server selection, the download/upload transfers and the latency probe are
//! all delegated to the client binary; providers only launch it and normalise
//! its JSON report into a [`SpeedMeasurement`] in bits per second.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::probes::{ProbeError, ProbeReport};

pub mod ookla;
pub mod speedtest_cli;

pub use self::ookla::OoklaProvider;
pub use self::speedtest_cli::SpeedtestCliProvider;

const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Raw result of one speed-test cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedMeasurement {
    pub download_bps: f64,
    pub upload_bps: f64,
    pub ping_ms: Option<f64>,
}

impl SpeedMeasurement {
    /// Validate and build a measurement. Rates must be finite and non-negative.
    pub fn new(
        download_bps: f64,
        upload_bps: f64,
        ping_ms: Option<f64>,
    ) -> Result<Self, ProbeError> {
        for (name, value) in [("download", download_bps), ("upload", upload_bps)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ProbeError::Parse(format!(
                    "{name} rate {value} is not a valid bit rate"
                )));
            }
        }
        Ok(Self {
            download_bps,
            upload_bps,
            ping_ms: ping_ms.filter(|p| p.is_finite()),
        })
    }

    pub fn download_mbps(&self) -> f64 {
        self.download_bps / BITS_PER_MEGABIT
    }

    pub fn upload_mbps(&self) -> f64 {
        self.upload_bps / BITS_PER_MEGABIT
    }
}

/// Static description of a provider.
#[derive(Debug, Clone)]
pub struct ProviderMeta {
    pub id: &'static str,
    pub display_name: &'static str,
    pub install_hint: &'static str,
}

/// Which speed-test client drives the measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProviderKind {
    /// The community `speedtest-cli` client.
    #[default]
    SpeedtestCli,
    /// The official Ookla `speedtest` binary.
    Ookla,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::SpeedtestCli => write!(f, "speedtest-cli"),
            ProviderKind::Ookla => write!(f, "ookla"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "speedtest-cli" | "speedtest_cli" => Ok(Self::SpeedtestCli),
            "ookla" | "ookla-cli" => Ok(Self::Ookla),
            other => Err(format!(
                "unknown speed-test provider '{other}', expected 'speedtest-cli' or 'ookla'"
            )),
        }
    }
}

/// Trait for all speed-test providers.
#[async_trait::async_trait]
pub trait SpeedTestProvider: Send + Sync {
    fn meta(&self) -> ProviderMeta;

    /// Whether the provider's client can be launched at all.
    async fn is_available(&self) -> bool;

    /// Run one full cycle: best server, download, upload, ping. No timeout.
    async fn run(&self) -> Result<SpeedMeasurement, ProbeError>;
}

/// Build the provider selected in the configuration.
pub fn provider_for(kind: ProviderKind) -> Box<dyn SpeedTestProvider> {
    match kind {
        ProviderKind::SpeedtestCli => Box::new(SpeedtestCliProvider::default()),
        ProviderKind::Ookla => Box::new(OoklaProvider::default()),
    }
}

/// Run the provider once and stamp the report with its start time.
pub async fn measure(provider: &dyn SpeedTestProvider) -> ProbeReport<SpeedMeasurement> {
    let started_at = Utc::now();
    let outcome = provider.run().await;
    ProbeReport::new(started_at, outcome)
}

/// Launch a client binary and collect its stdout.
pub(crate) async fn run_client(binary: &str, args: &[&str]) -> Result<Vec<u8>, ProbeError> {
    let output = tokio::process::Command::new(binary)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProbeError::ProviderUnavailable {
                    binary: binary.to_string(),
                }
            } else {
                ProbeError::Spawn {
                    binary: binary.to_string(),
                    source,
                }
            }
        })?;

    if !output.status.success() {
        return Err(ProbeError::ProviderFailed {
            binary: binary.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Check whether `binary --version` runs.
pub(crate) async fn client_responds(binary: &str) -> bool {
    tokio::process::Command::new(binary)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
