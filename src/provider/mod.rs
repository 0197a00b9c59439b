//! Parking Data Providers
//!
//! The hub reads parking state through a single trait, [`DataProvider`].
//! Two implementations exist and one is chosen at startup:
//!
//! - [`RestProvider`]: builds every view from the parking backend's REST API
//! - [`SqliteProvider`]: queries a local SQLite store directly
//!
//! The hub never knows which one is active.

mod error;
mod rest;
mod sqlite;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ProviderError, ProviderResult};
pub use rest::RestProvider;
pub use sqlite::SqliteProvider;
pub use types::{
    SectionOccupancy, Snapshot, SpaceDetail, SpaceFreedEvent, SpaceOccupiedEvent, Ticket,
};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderConfig, ProviderMode};

/// Read-only source of parking state
///
/// Every fetch returns a fresh value and may fail independently of the others.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Aggregate occupancy, revenue and active vehicle counts
    async fn fetch_snapshot(&self) -> ProviderResult<Snapshot>;

    /// Spaces grouped by section
    async fn fetch_section_breakdown(&self) -> ProviderResult<Vec<SectionOccupancy>>;

    /// Spaces that are currently free
    async fn fetch_available_spaces(&self) -> ProviderResult<Vec<SpaceDetail>>;

    /// Tickets without an exit time
    async fn fetch_active_tickets(&self) -> ProviderResult<Vec<Ticket>>;

    /// Check the backing source is reachable
    async fn health_check(&self) -> ProviderResult<()> {
        Ok(())
    }
}

/// Build the provider selected by configuration
pub fn from_config(config: &ProviderConfig) -> ProviderResult<Arc<dyn DataProvider>> {
    match config.mode {
        ProviderMode::Rest => {
            let timeout = Duration::from_secs(config.request_timeout_secs);
            let provider = RestProvider::new(&config.rest_api_url, timeout)?;
            Ok(Arc::new(provider))
        }
        ProviderMode::Database => {
            let path = config.database_url.as_deref().ok_or_else(|| {
                ProviderError::Unavailable("database mode requires DATABASE_URL".to_string())
            })?;
            Ok(Arc::new(SqliteProvider::open(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_from_config_rest() {
        let config = ProviderConfig::default();
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.name(), "rest");
    }

    #[test]
    fn test_from_config_database_requires_path() {
        let config = ProviderConfig {
            mode: ProviderMode::Database,
            database_url: None,
            ..Default::default()
        };
        let result = from_config(&config);
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_from_config_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parking.db");
        SqliteProvider::init_schema(&path).unwrap();

        let config = ProviderConfig {
            mode: ProviderMode::Database,
            database_url: Some(path.to_string_lossy().to_string()),
            ..Default::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.name(), "sqlite");
    }
}
