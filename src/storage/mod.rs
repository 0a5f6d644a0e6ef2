//! Result store: record types, the store trait and its backends.
//!
//! Both tables are append-only logs. Every insert runs in its own
//! transaction which is committed before the call returns, or rolled back
//! when dropped on error.

pub mod postgres;
pub mod schema;
pub mod sqlite;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::probes::ProbeReport;
use crate::speedtest::SpeedMeasurement;

pub use self::postgres::PgStore;
pub use self::sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("sqlite pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Row of `connection_tests`. Only failed probes are written.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTestRecord {
    pub timestamp: DateTime<Utc>,
    pub is_connected: bool,
}

impl ConnectionTestRecord {
    pub fn from_report<T>(report: &ProbeReport<T>) -> Self {
        Self {
            timestamp: report.started_at,
            is_connected: report.is_success(),
        }
    }
}

/// Row of `speed_tests`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestRecord {
    pub timestamp: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: Option<f64>,
}

impl SpeedTestRecord {
    /// Convert a report into a row. A failed probe becomes 0 / 0 / NULL.
    pub fn from_report(report: &ProbeReport<SpeedMeasurement>) -> Self {
        match &report.outcome {
            Ok(m) => Self {
                timestamp: report.started_at,
                download_mbps: m.download_mbps(),
                upload_mbps: m.upload_mbps(),
                ping_ms: m.ping_ms,
            },
            Err(_) => Self {
                timestamp: report.started_at,
                download_mbps: 0.0,
                upload_mbps: 0.0,
                ping_ms: None,
            },
        }
    }
}

/// Write side of the relational store. There is no read path.
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Create both tables if they do not exist. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    /// Insert one connectivity row and return its generated id.
    async fn log_connection_test(&self, record: &ConnectionTestRecord) -> Result<i64, StorageError>;

    /// Insert one speed row and return its generated id.
    async fn log_speed_test(&self, record: &SpeedTestRecord) -> Result<i64, StorageError>;
}

/// Open the store described by `config`. Connection problems surface here,
/// before any loop has started.
pub async fn connect(config: DatabaseConfig) -> Result<Arc<dyn ResultStore>, StorageError> {
    match config {
        DatabaseConfig::Postgres(pg) => {
            tracing::info!(
                host = %pg.host,
                port = pg.port,
                database = %pg.database,
                "Connecting to PostgreSQL"
            );
            Ok(Arc::new(PgStore::connect(&pg).await?))
        }
        DatabaseConfig::Sqlite(cfg) => {
            tracing::info!(path = %cfg.path.display(), "Opening SQLite database");
            let store = tokio::task::spawn_blocking(move || SqliteStore::open(&cfg.path)).await??;
            Ok(Arc::new(store))
        }
    }
}
