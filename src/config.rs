//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// CORS origins for plain HTTP routes; `*` allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Origins allowed to open a WebSocket; requests without an Origin pass
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:4200".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:4200".to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            cors_origins: default_cors_origins(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which data provider backs the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Parking backend REST API
    #[default]
    Rest,
    /// Direct queries against the parking database
    Database,
}

impl std::str::FromStr for ProviderMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rest" => Ok(ProviderMode::Rest),
            "database" | "db" => Ok(ProviderMode::Database),
            other => Err(ConfigError::Invalid(format!("unknown provider mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderMode::Rest => write!(f, "rest"),
            ProviderMode::Database => write!(f, "database"),
        }
    }
}

/// Data provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub mode: ProviderMode,

    #[serde(default = "default_rest_api_url")]
    pub rest_api_url: String,

    /// Path to the SQLite database (database mode)
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_rest_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::default(),
            rest_api_url: default_rest_api_url(),
            database_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Broadcast hub timing and sizing
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// Seconds between dashboard broadcasts
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Outbound messages buffered per connection
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Idle read deadline; a peer silent for this long is dropped
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    /// Keep-alive ping period, must be shorter than `pong_wait_secs`
    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,

    /// Deadline for a single socket write
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,
}

fn default_update_interval() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    256
}

fn default_pong_wait() -> u64 {
    60
}

fn default_ping_period() -> u64 {
    54 // 9/10 of pong wait
}

fn default_write_wait() -> u64 {
    10
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            queue_capacity: default_queue_capacity(),
            pong_wait_secs: default_pong_wait(),
            ping_period_secs: default_ping_period(),
            write_wait_secs: default_write_wait(),
        }
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        HubConfig {
            update_interval: Duration::from_secs(settings.update_interval_secs),
            queue_capacity: settings.queue_capacity,
            pong_wait: Duration::from_secs(settings.pong_wait_secs),
            ping_period: Duration::from_secs(settings.ping_period_secs),
            write_wait: Duration::from_secs(settings.write_wait_secs),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` for development, `json` for production
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path, the default locations, or the environment
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_with_env(path)?;
            tracing::info!("Loaded config from {:?}", path);
            return Ok(config);
        }

        let config_paths = [
            dirs::config_dir().map(|p| p.join("parking-hub").join("config.toml")),
            Some(PathBuf::from("/etc/parking-hub/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Ok(Self::from_env())
    }

    /// Apply overrides using the deployment's environment variable names
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Provider overrides
        if let Some(mode) = var("MODE") {
            match mode.parse() {
                Ok(mode) => self.provider.mode = mode,
                Err(e) => tracing::warn!("Ignoring MODE: {}", e),
            }
        }
        if let Some(url) = var("REST_API_URL") {
            self.provider.rest_api_url = url;
        }
        if let Some(url) = var("DATABASE_URL") {
            self.provider.database_url = Some(url);
        }

        // Server overrides
        if let Some(port) = var("WS_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Some(path) = var("WS_PATH") {
            self.server.ws_path = path;
        }
        if let Some(origin) = var("CORS_ORIGIN") {
            self.server.cors_origins = split_list(&origin);
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = split_list(&origins);
        }

        // Hub overrides
        if let Some(interval) = var("UPDATE_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                self.hub.update_interval_secs = secs;
            }
        }

        // Logging overrides
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check settings that would make the server misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider.mode {
            ProviderMode::Database if self.provider.database_url.is_none() => {
                return Err(ConfigError::Invalid(
                    "DATABASE_URL is required when MODE=database".to_string(),
                ));
            }
            ProviderMode::Rest if self.provider.rest_api_url.is_empty() => {
                return Err(ConfigError::Invalid(
                    "REST_API_URL is required when MODE=rest".to_string(),
                ));
            }
            _ => {}
        }

        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "ws_path must start with '/': {}",
                self.server.ws_path
            )));
        }

        let hub = &self.hub;
        if hub.update_interval_secs == 0 || hub.queue_capacity == 0 || hub.write_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "update interval, queue capacity and write wait must be non-zero".to_string(),
            ));
        }
        if hub.ping_period_secs == 0 || hub.ping_period_secs >= hub.pong_wait_secs {
            return Err(ConfigError::Invalid(format!(
                "ping period ({}s) must be non-zero and shorter than pong wait ({}s)",
                hub.ping_period_secs, hub.pong_wait_secs
            )));
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# parking-hub Configuration
#
# Environment variables override these settings:
# - MODE (rest | database)
# - REST_API_URL
# - DATABASE_URL
# - WS_PORT
# - WS_PATH
# - CORS_ORIGIN (comma separated)
# - ALLOWED_ORIGINS (comma separated)
# - UPDATE_INTERVAL (seconds)
# - LOG_LEVEL
# - LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8080

# WebSocket endpoint path
ws_path = "/ws"

# CORS origins for HTTP routes ("*" allows any)
cors_origins = ["*"]

# Origins allowed to open a WebSocket
allowed_origins = ["http://localhost:4200", "http://localhost:3000", "http://127.0.0.1:4200"]

[provider]
# Where dashboard data comes from: "rest" or "database"
mode = "rest"

# Parking backend REST API
rest_api_url = "http://localhost:3000"

# SQLite database path (database mode)
# database_url = "/var/lib/parking/parking.db"

# REST request timeout in seconds
request_timeout_secs = 10

[hub]
# Seconds between dashboard broadcasts
update_interval_secs = 5

# Outbound messages buffered per connection before dropping
queue_capacity = 256

# Drop peers silent for this many seconds
pong_wait_secs = 60

# Keep-alive ping period (must be shorter than pong_wait_secs)
ping_period_secs = 54

# Deadline for a single socket write
write_wait_secs = 10

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
