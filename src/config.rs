use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};
use tracing::warn;

use crate::{
    error::{RateLimitError, Result},
    limiter::{LimiterSettings, CONTACT_MESSAGE_KEY, ORDER_SUBMISSION_KEY},
};

/// Prefix of environment variables overriding file settings,
/// e.g. `ATTEMPT_GUARD__STORAGE__REDIS_URL`
pub const ENV_PREFIX: &str = "ATTEMPT_GUARD";

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default = "default_limiters")]
    pub limiters: Vec<LimiterConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            storage: StorageConfig::default(),
            limiters: default_limiters(),
        }
    }
}

/// Where attempt records are kept.
///
/// Redis is used when `redis_url` is set, otherwise records stay in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub redis_url: Option<String>,

    /// Prepended to every storage key as `prefix:key`
    #[serde(default)]
    pub key_prefix: String,

    /// Expiry put on Redis keys. Must not be shorter than any limiter window;
    /// defaults to twice the longest window.
    pub key_ttl_secs: Option<u64>,

    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: String::new(),
            key_ttl_secs: None,
            memory_capacity: default_memory_capacity(),
        }
    }
}

/// One named limiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub name: String,
    pub max_attempts: u32,
    pub window_secs: u64,
    pub storage_key: String,
}

impl LimiterConfig {
    pub fn to_settings(&self) -> Result<LimiterSettings> {
        LimiterSettings::new(
            self.max_attempts,
            Duration::from_secs(self.window_secs),
            self.storage_key.clone(),
        )
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_memory_capacity() -> u64 {
    10_000
}

fn default_limiters() -> Vec<LimiterConfig> {
    vec![
        LimiterConfig {
            name: "orders".to_string(),
            max_attempts: 3,
            window_secs: 3_600,
            storage_key: ORDER_SUBMISSION_KEY.to_string(),
        },
        LimiterConfig {
            name: "contact".to_string(),
            max_attempts: 5,
            window_secs: 3_600,
            storage_key: CONTACT_MESSAGE_KEY.to_string(),
        },
    ]
}

impl ServiceConfig {
    /// Layer an optional config file under `ATTEMPT_GUARD__*` environment
    /// variables. Missing values fall back to the built-in defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config: ServiceConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject ambiguous limiter names and invalid limits
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();

        for limiter in &self.limiters {
            if limiter.name.is_empty() {
                return Err(RateLimitError::Config(
                    "limiter name must not be empty".to_string(),
                ));
            }
            if !names.insert(limiter.name.as_str()) {
                return Err(RateLimitError::Config(format!(
                    "duplicate limiter name: {}",
                    limiter.name
                )));
            }
            if !keys.insert(limiter.storage_key.as_str()) {
                warn!(
                    limiter = %limiter.name,
                    storage_key = %limiter.storage_key,
                    "storage key shared with another limiter; they will share one record"
                );
            }
            limiter.to_settings()?;
        }

        if let Some(ttl) = self.storage.key_ttl_secs {
            let longest = self.longest_window_secs();
            if ttl < longest {
                return Err(RateLimitError::Config(format!(
                    "key_ttl_secs ({}) is shorter than the longest limiter window ({}s)",
                    ttl, longest
                )));
            }
        }

        Ok(())
    }

    /// Expiry for Redis keys: the configured TTL, or twice the longest window
    pub fn redis_key_ttl(&self) -> Duration {
        let secs = self
            .storage
            .key_ttl_secs
            .unwrap_or_else(|| self.longest_window_secs().saturating_mul(2));
        Duration::from_secs(secs.max(1))
    }

    fn longest_window_secs(&self) -> u64 {
        self.limiters
            .iter()
            .map(|limiter| limiter.window_secs)
            .max()
            .unwrap_or(0)
    }
}

/// Load configuration from YAML string
pub fn load_config_from_yaml(yaml: &str) -> Result<ServiceConfig> {
    let config: ServiceConfig = serde_yaml::from_str(yaml)
        .map_err(|e| RateLimitError::Config(format!("Failed to parse YAML: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from YAML file
pub fn load_config_from_file(path: &str) -> Result<ServiceConfig> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_yaml(&content)
}
