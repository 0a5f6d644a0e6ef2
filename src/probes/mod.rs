//! Active measurement primitives shared by the connectivity and speed probes.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub mod http;

pub use self::http::{ConnectivityProbe, HttpProbe};

/// Why a probe could not produce a usable measurement.
///
/// The scheduler collapses every variant into the same sentinel row, so the
/// distinction only reaches the logs.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{binary} not found in PATH")]
    ProviderUnavailable { binary: String },

    #[error("could not launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} exited with code {code:?}: {stderr}")]
    ProviderFailed {
        binary: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unparsable speed-test output: {0}")]
    Parse(String),
}

/// Outcome of a single probe, stamped with the instant it started.
#[derive(Debug)]
pub struct ProbeReport<T> {
    pub started_at: DateTime<Utc>,
    pub outcome: Result<T, ProbeError>,
}

impl<T> ProbeReport<T> {
    pub fn new(started_at: DateTime<Utc>, outcome: Result<T, ProbeError>) -> Self {
        Self {
            started_at,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
