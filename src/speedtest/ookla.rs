use super::{client_responds, run_client, ProviderMeta, SpeedMeasurement, SpeedTestProvider};
use crate::probes::ProbeError;
use serde::Deserialize;

/// Official Speedtest.net CLI (`speedtest`).
pub struct OoklaProvider {
    binary: String,
}

impl Default for OoklaProvider {
    fn default() -> Self {
        Self::with_binary("speedtest")
    }
}

impl OoklaProvider {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl SpeedTestProvider for OoklaProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: "ookla-cli",
            display_name: "Speedtest.net (Ookla)",
            install_hint: "Install the official CLI: https://www.speedtest.net/apps/cli",
        }
    }

    async fn is_available(&self) -> bool {
        client_responds(&self.binary).await
    }

    async fn run(&self) -> Result<SpeedMeasurement, ProbeError> {
        let stdout = run_client(
            &self.binary,
            &["--format=json", "--accept-license", "--accept-gdpr"],
        )
        .await?;
        parse_output(&String::from_utf8_lossy(&stdout))
    }
}

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(rename = "type")]
    kind: Option<String>,
    level: Option<String>,
    message: Option<String>,
    ping: Option<Ping>,
    download: Option<Transfer>,
    upload: Option<Transfer>,
}

#[derive(Debug, Deserialize)]
struct Ping {
    latency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Transfer {
    /// Bytes per second.
    bandwidth: f64,
}

/// Parse the CLI's JSON output. The CLI may interleave `log` lines with the
/// final `result` object, so every line is inspected.
pub fn parse_output(stdout: &str) -> Result<SpeedMeasurement, ProbeError> {
    let mut last_error = None;

    for raw in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let line: Line = match serde_json::from_str(raw) {
            Ok(line) => line,
            Err(e) => {
                last_error = Some(format!("invalid JSON: {e}"));
                continue;
            }
        };

        match line.kind.as_deref() {
            Some("result") | None if line.download.is_some() => {
                let (Some(download), Some(upload)) = (line.download, line.upload) else {
                    return Err(ProbeError::Parse("result is missing upload".into()));
                };
                return SpeedMeasurement::new(
                    download.bandwidth * 8.0,
                    upload.bandwidth * 8.0,
                    line.ping.and_then(|p| p.latency),
                );
            }
            Some("log") if line.level.as_deref() == Some("error") => {
                last_error = line.message;
            }
            _ => {}
        }
    }

    Err(ProbeError::Parse(
        last_error.unwrap_or_else(|| "no result object in output".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_converts_bytes_to_bits() {
        let out = r#"{"type":"result","timestamp":"2024-05-01T10:00:00Z","ping":{"jitter":0.4,"latency":15.2},"download":{"bandwidth":6250000,"bytes":90000000,"elapsed":14000},"upload":{"bandwidth":1250000,"bytes":15000000,"elapsed":12000},"packetLoss":0,"isp":"Example ISP"}"#;
        let m = parse_output(out).unwrap();
        assert_eq!(m.download_bps, 50_000_000.0);
        assert_eq!(m.upload_bps, 10_000_000.0);
        assert_eq!(m.download_mbps(), 50.0);
        assert_eq!(m.ping_ms, Some(15.2));
    }

    #[test]
    fn test_parse_skips_log_lines() {
        let out = concat!(
            r#"{"type":"log","timestamp":"2024-05-01T10:00:00Z","message":"Configuration - Couldn't resolve host name","level":"warning"}"#,
            "\n",
            r#"{"type":"result","ping":{"latency":9.0},"download":{"bandwidth":125000},"upload":{"bandwidth":12500}}"#,
            "\n"
        );
        let m = parse_output(out).unwrap();
        assert_eq!(m.download_bps, 1_000_000.0);
        assert_eq!(m.upload_bps, 100_000.0);
    }

    #[test]
    fn test_parse_surfaces_error_log() {
        let out = r#"{"type":"log","timestamp":"2024-05-01T10:00:00Z","message":"Cannot open socket: Timeout occurred in connect.","level":"error"}"#;
        match parse_output(out).unwrap_err() {
            ProbeError::Parse(msg) => assert!(msg.contains("Cannot open socket")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_missing_ping_is_none() {
        let out = r#"{"type":"result","download":{"bandwidth":100},"upload":{"bandwidth":100}}"#;
        assert_eq!(parse_output(out).unwrap().ping_ms, None);
    }

    #[test]
    fn test_parse_empty_output_fails() {
        assert!(matches!(parse_output(""), Err(ProbeError::Parse(_))));
        assert!(matches!(parse_output("not json"), Err(ProbeError::Parse(_))));
    }
}
