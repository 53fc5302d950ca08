use thiserror::Error;

/// Result type for attempt-guard operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors raised by storage backends, configuration and service lookups.
///
/// Limiter operations themselves never return these; they log and degrade.
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Limiter not found: {0}")]
    LimiterNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
