//! Parking Hub Server
//!
//! Run with: cargo run --bin parking-hub -- --config config.toml
//!
//! # Configuration
//!
//! Read from `--config`, then the default locations, then plain defaults.
//! Environment variables override file settings:
//! - `MODE`: `rest` or `database` (default: rest)
//! - `REST_API_URL`: Parking REST API (default: http://localhost:3000)
//! - `DATABASE_URL`: SQLite database path (database mode)
//! - `WS_PORT`: Port to listen on (default: 8080)
//! - `WS_PATH`: WebSocket path (default: /ws)
//! - `ALLOWED_ORIGINS`: Comma separated WebSocket origins
//! - `UPDATE_INTERVAL`: Seconds between pushes (default: 5)
//! - `RUST_LOG`: Log filter, wins over `LOG_LEVEL`

use clap::Parser;
use parking_hub::config::{Config, LoggingConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "parking-hub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time WebSocket hub for the parking dashboard")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    init_tracing(&config.logging);

    tracing::info!("Starting parking hub v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        mode = %config.provider.mode,
        update_interval_secs = config.hub.update_interval_secs,
        "Configuration loaded"
    );

    parking_hub::api::run(config).await?;

    tracing::info!("Parking hub stopped");
    Ok(())
}

/// Resolve configuration and apply command-line overrides
///
/// The logging config is not known yet, so resolution logs through a plain
/// stderr subscriber for its duration.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "parking_hub=info".into()),
        )
        .with_writer(std::io::stderr)
        .finish();

    let mut config = tracing::subscriber::with_default(bootstrap, || {
        Config::resolve(args.config.as_deref())
    })?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = logging.level.trim();
        if level.contains('=') {
            level.into()
        } else {
            format!("parking_hub={},tower_http={}", level, level).into()
        }
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
