//! PostgreSQL backend.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use super::{schema, ConnectionTestRecord, ResultStore, SpeedTestRecord, StorageError};
use crate::config::PostgresConfig;

/// How long startup waits for the server before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect eagerly so an unreachable server fails here, not in a loop.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(connect_options(config))
            .await?;
        Ok(Self { pool })
    }
}

/// Build options field by field so credentials need no URL escaping.
pub fn connect_options(config: &PostgresConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
}

#[async_trait::async_trait]
impl ResultStore for PgStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for ddl in schema::POSTGRES_SCHEMA {
            sqlx::query(ddl).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn log_connection_test(
        &self,
        record: &ConnectionTestRecord,
    ) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO connection_tests (timestamp, is_connected)
             VALUES ($1, $2)
             RETURNING conn_test_id",
        )
        .bind(record.timestamp)
        .bind(record.is_connected)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(i64::from(id))
    }

    async fn log_speed_test(&self, record: &SpeedTestRecord) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await?;
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO speed_tests (timestamp, download_speed, upload_speed, ping)
             VALUES ($1, $2, $3, $4)
             RETURNING speed_test_id",
        )
        .bind(record.timestamp)
        .bind(record.download_mbps)
        .bind(record.upload_mbps)
        .bind(record.ping_ms)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(i64::from(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, MonitorConfig};
    use chrono::Utc;

    fn sample() -> PostgresConfig {
        PostgresConfig {
            username: "monitor".into(),
            password: "p@ss:word/with#chars".into(),
            host: "db.internal".into(),
            port: 6543,
            database: "netlog".into(),
        }
    }

    #[test]
    fn test_connect_options_carry_every_field() {
        let opts = connect_options(&sample());
        assert_eq!(opts.get_host(), "db.internal");
        assert_eq!(opts.get_port(), 6543);
        assert_eq!(opts.get_username(), "monitor");
        assert_eq!(opts.get_database(), Some("netlog"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = PostgresConfig {
            host: "127.0.0.1".into(),
            port,
            ..sample()
        };
        let started = std::time::Instant::now();
        let result = PgStore::connect(&config).await;
        assert!(result.is_err());
        assert!(started.elapsed() < ACQUIRE_TIMEOUT + Duration::from_secs(5));
    }

    // Needs a live server: DB_USERNAME, DB_PASSWORD, DB_HOST, DB_PORT and
    // DB_NAME must point at a scratch database.
    #[tokio::test]
    #[ignore]
    async fn test_live_schema_and_inserts() {
        let _ = dotenvy::dotenv();
        let config = MonitorConfig::from_env().expect("DB_* variables");
        let DatabaseConfig::Postgres(pg) = config.database else {
            panic!("DB_DRIVER must be postgres for this test");
        };

        let store = PgStore::connect(&pg).await.unwrap();
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = current_schema()
               AND table_name IN ('connection_tests', 'speed_tests')",
        )
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(tables, 2);

        let id = store
            .log_speed_test(&SpeedTestRecord {
                timestamp: Utc::now(),
                download_mbps: 50.0,
                upload_mbps: 10.0,
                ping_ms: Some(15.2),
            })
            .await
            .unwrap();

        let (down, up, ping): (f64, f64, Option<f64>) = sqlx::query_as(
            "SELECT download_speed, upload_speed, ping FROM speed_tests WHERE speed_test_id = $1",
        )
        .bind(id as i32)
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!((down, up, ping), (50.0, 10.0, Some(15.2)));
    }
}
