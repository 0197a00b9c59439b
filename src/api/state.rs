//! Application State
//!
//! Shared state accessible by all HTTP handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::provider::DataProvider;
use crate::websocket::{ConnectionHub, HubConfig};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// WebSocket connection hub
    pub hub: Arc<ConnectionHub>,
    /// Data provider backing the hub
    pub provider: Arc<dyn DataProvider>,
    /// Resolved configuration
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state with a hub built from the configuration
    pub fn new(provider: Arc<dyn DataProvider>, config: Config) -> Self {
        let hub_config = HubConfig::from(&config.hub);
        let hub = Arc::new(ConnectionHub::new(Arc::clone(&provider), hub_config));
        Self::with_hub(hub, provider, config)
    }

    /// Create state around an existing hub
    pub fn with_hub(
        hub: Arc<ConnectionHub>,
        provider: Arc<dyn DataProvider>,
        config: Config,
    ) -> Self {
        Self {
            hub,
            provider,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn client_count(&self) -> usize {
        self.hub.connection_count().await
    }
}
