//! Runtime configuration for the linkwatch daemon.
//!
//! Everything is read once at startup from the process environment (after an
//! optional `.env` file has been merged in by the binary) and then passed by
//! value into the components that need it. Probe targets and loop intervals
//! are compiled-in defaults; only the database, the speed-test provider and
//! the log format are environment-driven.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::speedtest::ProviderKind;

/// Endpoint used for the reachability check.
pub const DEFAULT_PROBE_URL: &str = "http://www.google.com";

/// Fallback SQLite location when `DB_DRIVER=sqlite` and `DB_PATH` is unset.
pub const DEFAULT_SQLITE_PATH: &str = "data/linkwatch.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the daemon.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub database: DatabaseConfig,
    pub connectivity: ConnectivityConfig,
    pub speed: SpeedConfig,
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var              | Default                 |
    /// |----------------------|-------------------------|
    /// | `DB_DRIVER`          | `postgres`              |
    /// | `DB_USERNAME`        | required for postgres   |
    /// | `DB_PASSWORD`        | required for postgres   |
    /// | `DB_HOST`            | required for postgres   |
    /// | `DB_PORT`            | required for postgres   |
    /// | `DB_NAME`            | required for postgres   |
    /// | `DB_PATH`            | `data/linkwatch.db`     |
    /// | `SPEEDTEST_PROVIDER` | `speedtest-cli`         |
    /// | `LOG_FORMAT`         | `text`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let database = match env.get("DB_DRIVER").as_deref() {
            None | Some("postgres") | Some("postgresql") => {
                DatabaseConfig::Postgres(PostgresConfig {
                    username: env.require("DB_USERNAME")?,
                    password: env.require("DB_PASSWORD")?,
                    host: env.require("DB_HOST")?,
                    port: env.parse_required("DB_PORT")?,
                    database: env.require("DB_NAME")?,
                })
            }
            Some("sqlite") => DatabaseConfig::Sqlite(SqliteConfig {
                path: env
                    .get("DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
            }),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "DB_DRIVER",
                    value: other.to_string(),
                    reason: "expected 'postgres' or 'sqlite'".to_string(),
                })
            }
        };

        let speed = SpeedConfig {
            provider: env
                .parse_optional("SPEEDTEST_PROVIDER")?
                .unwrap_or_default(),
            ..SpeedConfig::default()
        };

        let logging = LoggingConfig {
            format: env.parse_optional("LOG_FORMAT")?.unwrap_or_default(),
        };

        Ok(Self {
            database,
            connectivity: ConnectivityConfig::default(),
            speed,
            logging,
        })
    }
}

/// Environment accessor that treats blank values as unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_required<T>(&self, key: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.require(key)?;
        parse_value(key, raw)
    }

    fn parse_optional<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key).map(|raw| parse_value(key, raw)).transpose()
    }
}

fn parse_value<T>(var: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value: raw,
    })
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Which relational store the results are written to.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    Postgres(PostgresConfig),
    Sqlite(SqliteConfig),
}

/// Connection parameters for a PostgreSQL server.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

/// Location of an embedded SQLite database file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Settings for the reachability loop.
#[derive(Debug, Clone)]
pub struct ConnectivityConfig {
    pub target_url: String,
    /// Hard limit for the whole GET, connect included.
    pub timeout: Duration,
    /// Sleep between the end of one probe and the start of the next.
    pub interval: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_PROBE_URL.to_string(),
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(1),
        }
    }
}

/// Settings for the bandwidth loop.
#[derive(Debug, Clone)]
pub struct SpeedConfig {
    pub provider: ProviderKind,
    pub interval: Duration,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            interval: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected 'text' or 'json'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
