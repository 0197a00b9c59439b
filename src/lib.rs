//! # Parking Hub
//!
//! Real-time WebSocket hub for a parking-lot dashboard. Pulls occupancy,
//! revenue and ticket state from a data provider and pushes it to every
//! connected browser.
//!
//! ## Features
//!
//! - **Periodic fan-out**: one snapshot fetch per interval, delivered to all
//!   clients without letting a slow client hold up the others
//! - **On-demand views**: clients can request the snapshot, the per-section
//!   breakdown, free spaces or active tickets at any time
//! - **Backpressure**: bounded per-client queues that drop instead of block
//! - **Two backends**: the parking REST API or a local SQLite database
//! - **Graceful shutdown**: every socket is closed before the process exits
//!
//! ## Modules
//!
//! - [`provider`]: Data provider trait, DTOs and the REST/SQLite backends
//! - [`websocket`]: Connection hub, per-client pumps and wire messages
//! - [`api`]: HTTP server with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parking_hub::provider::RestProvider;
//! use parking_hub::websocket::{ConnectionHub, HubConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Arc::new(RestProvider::new("http://localhost:3000", Duration::from_secs(10))?);
//!     let hub = Arc::new(ConnectionHub::new(provider, HubConfig::default()));
//!
//!     let refresh = hub.start_refresh_loop();
//!     println!("{} clients connected", hub.connection_count().await);
//!
//!     hub.shutdown().await;
//!     refresh.await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod provider;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig, ProviderConfig, ProviderMode};

pub use provider::{
    DataProvider, ProviderError, ProviderResult, RestProvider, SectionOccupancy, Snapshot,
    SpaceDetail, SqliteProvider, Ticket,
};

pub use websocket::{
    ClientMessage, Connection, ConnectionHub, EnqueueError, HubConfig, HubError, ServerMessage,
};
