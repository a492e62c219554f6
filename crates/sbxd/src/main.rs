//! sbxd: signbox kiosk daemon
//!
//! Usage:
//!   sbxd [--config /etc/signbox/config.toml]
//!
//! Keeps the local media set converged with the remote catalog, feeds
//! playback, reports presence/telemetry, and maintains the BLE control
//! peripheral link.

mod daemon;
mod playback;
mod reporter;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sbxd", version, about = "signbox kiosk daemon")]
struct Cli {
    /// Path to signbox.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SBX_CONFIG",
        default_value = "/etc/signbox/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SBX_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "SBX_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "sbxd starting"
    );

    let config = load_config(&cli.config).await?;
    daemon::run(config).await
}

async fn load_config(path: &PathBuf) -> Result<sbx_core::config::SbxConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        Ok(sbx_core::config::SbxConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
