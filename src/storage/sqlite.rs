//! Embedded SQLite backend.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};

use super::{schema, ConnectionTestRecord, ResultStore, SpeedTestRecord, StorageError};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Upper bound on waiting for a pooled connection.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

fn init_connection(c: &mut Connection) -> rusqlite::Result<()> {
    c.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
}

/// Same layout as the column default: millisecond precision, `Z` suffix.
fn sql_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open (or create) the database file. Blocking; call from
    /// `spawn_blocking` when already inside the runtime.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // r2d2 retries a failing manager until its timeout, so surface an
        // unopenable file here.
        let mut first = Connection::open(path)?;
        init_connection(&mut first)?;
        drop(first);

        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        let pool = R2D2Pool::builder()
            .max_size(4)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)?;
        Ok(Self { pool })
    }

    /// Run `f` on a pooled connection off the async executor.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl ResultStore for SqliteStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| Ok(schema::migrate(conn)?)).await
    }

    async fn log_connection_test(
        &self,
        record: &ConnectionTestRecord,
    ) -> Result<i64, StorageError> {
        let timestamp = sql_timestamp(&record.timestamp);
        let is_connected = record.is_connected;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO connection_tests (timestamp, is_connected) VALUES (?1, ?2)",
                params![timestamp, is_connected],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    async fn log_speed_test(&self, record: &SpeedTestRecord) -> Result<i64, StorageError> {
        let record = record.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO speed_tests (timestamp, download_speed, upload_speed, ping)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    sql_timestamp(&record.timestamp),
                    record.download_mbps,
                    record.upload_mbps,
                    record.ping_ms
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
    }
}
