//! Parking Hub CLI
//!
//! Operator commands for the parking hub:
//! - Run a single provider fetch and print it
//! - Check a running server
//! - Generate a config file or an empty SQLite database

use clap::{Parser, Subcommand};
use parking_hub::config::{generate_default_config, Config, ProviderMode};
use parking_hub::provider::{self, DataProvider, SqliteProvider};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "parking-hub-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator tools for the parking dashboard hub")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use this provider mode instead of the configured one (rest, database)
    #[arg(long, global = true)]
    pub mode: Option<ProviderMode>,

    /// Print compact JSON instead of pretty JSON
    #[arg(long, global = true)]
    pub compact: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the aggregate dashboard snapshot
    Snapshot,

    /// Fetch spaces grouped by section
    Sections,

    /// Fetch free spaces
    Spaces,

    /// Fetch tickets without an exit time
    Tickets,

    /// Query a running server's /health endpoint
    Health {
        /// Server base URL
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,
    },

    /// Print a default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create an empty SQLite database with the parking schema
    InitDb {
        /// Database file to create
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Snapshot => {
            let provider = load_provider(&cli)?;
            print_json(&provider.fetch_snapshot().await?, cli.compact)?;
        }

        Commands::Sections => {
            let provider = load_provider(&cli)?;
            print_json(&provider.fetch_section_breakdown().await?, cli.compact)?;
        }

        Commands::Spaces => {
            let provider = load_provider(&cli)?;
            print_json(&provider.fetch_available_spaces().await?, cli.compact)?;
        }

        Commands::Tickets => {
            let provider = load_provider(&cli)?;
            print_json(&provider.fetch_active_tickets().await?, cli.compact)?;
        }

        Commands::Health { url } => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()?;

            let response = client
                .get(format!("{}/health", url.trim_end_matches('/')))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                eprintln!("Server unhealthy ({}): {}", status, text);
                std::process::exit(1);
            }

            let health: serde_json::Value = response.json().await?;
            println!(
                "Status: {}  Clients: {}  Provider: {}  Uptime: {}s",
                health["status"].as_str().unwrap_or("unknown"),
                health["clients"],
                health["provider"].as_str().unwrap_or("unknown"),
                health["uptime_seconds"],
            );
        }

        Commands::InitConfig { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(path, content)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }

        Commands::InitDb { path } => {
            if path.exists() {
                anyhow::bail!("{:?} already exists", path);
            }
            SqliteProvider::init_schema(path)?;
            println!("Created database at {:?}", path);
        }
    }

    Ok(())
}

/// Resolve configuration and build the selected provider
fn load_provider(cli: &Cli) -> anyhow::Result<Arc<dyn DataProvider>> {
    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.provider.mode = mode;
    }
    config.validate()?;

    Ok(provider::from_config(&config.provider)?)
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mode_flag() {
        let cli = Cli::try_parse_from(["parking-hub-cli", "snapshot", "--mode", "database"]).unwrap();
        assert_eq!(cli.mode, Some(ProviderMode::Database));
        assert!(matches!(cli.command, Commands::Snapshot));
    }

    #[test]
    fn test_parse_init_db() {
        let cli = Cli::try_parse_from(["parking-hub-cli", "init-db", "/tmp/parking.db"]).unwrap();
        match cli.command {
            Commands::InitDb { path } => assert_eq!(path, PathBuf::from("/tmp/parking.db")),
            _ => panic!("Expected init-db"),
        }
    }
}
