use anyhow::{Context, Result};
use clap::Parser;
use linkwatch::config::{LogFormat, LoggingConfig, MonitorConfig};

#[derive(Parser)]
#[command(
    name = "linkwatch",
    about = "Unattended internet connectivity and bandwidth logger",
    version,
    long_about = "Unattended internet connectivity and bandwidth logger.\n\n\
        Checks reachability every second and records each outage, runs a speed \
        test every minute and records every result. All settings come from the \
        environment (or a .env file): DB_DRIVER, DB_USERNAME, DB_PASSWORD, \
        DB_HOST, DB_PORT, DB_NAME, DB_PATH, SPEEDTEST_PROVIDER, RUST_LOG, LOG_FORMAT."
)]
struct Cli {}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match logging.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Real environment variables win over .env entries.
    let _ = dotenvy::dotenv();

    let _cli = Cli::parse();

    let config = MonitorConfig::from_env().context("invalid configuration")?;
    init_tracing(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = ?config.database,
        provider = %config.speed.provider,
        "Starting linkwatch"
    );

    linkwatch::run(config).await
}
