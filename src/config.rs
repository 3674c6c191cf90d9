use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Physical attempts per logical call
    pub max_attempts: u32,
    /// Starting backoff window in milliseconds, doubled after every attempt
    pub backoff_base_ms: u64,
}

/// Polling engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Capacity of the live event channel
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory` or `sqlite`
    pub backend: String,
    /// SQLite database file, used by the `sqlite` backend
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cloudflare-eth.com".to_string(),
            timeout_seconds: 30,
            max_attempts: 5,
            backoff_base_ms: 1000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            event_capacity: 100,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: "./tracker.db".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: raw }),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file named by `CONFIG_FILE`
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "tracker.toml".to_string());

        if !Path::new(&config_path).exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ConfigError::FileNotFound(config_path.clone()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = env::var("ETH_RPC_URL") {
            self.rpc.endpoint = endpoint;
        }
        if let Some(timeout) = parse_env("RPC_TIMEOUT_SECONDS")? {
            self.rpc.timeout_seconds = timeout;
        }
        if let Some(attempts) = parse_env("RPC_MAX_ATTEMPTS")? {
            self.rpc.max_attempts = attempts;
        }
        if let Some(base) = parse_env("RPC_BACKOFF_BASE_MS")? {
            self.rpc.backoff_base_ms = base;
        }

        if let Some(interval) = parse_env("POLL_INTERVAL_MS")? {
            self.monitor.poll_interval_ms = interval;
        }
        if let Some(capacity) = parse_env("EVENT_CHANNEL_CAPACITY")? {
            self.monitor.event_capacity = capacity;
        }

        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(path) = env::var("DATABASE_PATH") {
            self.storage.path = path;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rpc.endpoint.starts_with("http://") && !self.rpc.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.rpc.endpoint.clone()));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(ConfigError::InvalidValue {
                key: "rpc.timeout_seconds".to_string(),
                value: self.rpc.timeout_seconds.to_string(),
            });
        }

        if self.rpc.max_attempts == 0 || self.rpc.max_attempts > 20 {
            return Err(ConfigError::InvalidValue {
                key: "rpc.max_attempts".to_string(),
                value: self.rpc.max_attempts.to_string(),
            });
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "monitor.poll_interval_ms".to_string(),
                value: self.monitor.poll_interval_ms.to_string(),
            });
        }

        if self.monitor.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "monitor.event_capacity".to_string(),
                value: self.monitor.event_capacity.to_string(),
            });
        }

        match self.storage.backend.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.storage.path.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "storage.path".to_string(),
                        value: self.storage.path.clone(),
                    });
                }
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "storage.backend".to_string(),
                    value: other.to_string(),
                })
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: self.logging.level.clone(),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                value: self.logging.format.clone(),
            });
        }

        Ok(())
    }

    /// Render the default configuration as TOML
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }
}
