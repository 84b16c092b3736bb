//! Structured logging initialization

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
#[error("failed to initialize tracing: {0}")]
pub struct LoggingError(String);

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error if
/// a global subscriber has already been installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| LoggingError(e.to_string()))
}
