//! Configuration management

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub task: TaskConfig,
    pub logging: LoggingConfig,
}

/// Shared key-value cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Connection URL of the Redis-compatible backend
    pub url: String,
    /// Prefix prepended to every key written by this deployment
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "chartfleet".to_string(),
        }
    }
}

/// Task broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Maximum number of tasks executing concurrently
    pub max_concurrent_tasks: usize,
    /// Poll interval used by synchronous waiters (in seconds)
    pub poll_interval_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            poll_interval_secs: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is not set
    pub level: String,
    /// Output format: "text" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Sources are layered in order of precedence (later wins):
    /// `config/default`, `config/local`, then `CHARTFLEET__` environment
    /// variables with `__` separators.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("CHARTFLEET").separator("__"))
            .build()?;

        let loaded: Config = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate configuration invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.url.is_empty() {
            return Err(ConfigError::Invalid("cache.url can not be empty".to_string()));
        }
        if self.task.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "task.max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
