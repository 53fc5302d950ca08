use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    error::{RateLimitError, Result},
    store::AttemptStore,
    utils::subject_key,
};

/// Redis client configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: Option<Duration>,
    pub command_timeout: Option<Duration>,
    /// Prepended to every key as `prefix:key`
    pub key_prefix: String,
    /// Expiry set on every write
    pub key_ttl: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout: Some(Duration::from_secs(5)),
            command_timeout: Some(Duration::from_secs(1)),
            key_prefix: String::new(),
            key_ttl: None,
        }
    }
}

impl RedisConfig {
    /// Full Redis key for a limiter's storage key
    pub fn key_for(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            subject_key(&self.key_prefix, key)
        }
    }
}

/// Attempt store backed by Redis string keys.
///
/// Each command runs on its own; there is no transaction around the
/// limiter's read-then-write.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisConfig,
}

impl RedisStore {
    /// Connect and verify the server answers PING
    pub async fn new(config: RedisConfig) -> Result<Self> {
        info!("Creating Redis client for URL: {}", config.url);

        let client = redis::Client::open(config.url.clone()).map_err(|e| {
            warn!("Failed to create Redis client: {}", e);
            RateLimitError::Redis(e)
        })?;

        let connect_timeout = config.connection_timeout.unwrap_or(Duration::from_secs(10));
        let connection = match tokio::time::timeout(connect_timeout, client.get_connection_manager()).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                warn!("Failed to create connection manager: {}", e);
                return Err(RateLimitError::Redis(e));
            }
            Err(_) => {
                warn!(
                    "Timeout while creating connection manager ({}s)",
                    connect_timeout.as_secs()
                );
                return Err(RateLimitError::Storage(
                    "Timeout while creating Redis connection manager".to_string(),
                ));
            }
        };

        let store = Self { connection, config };
        store.health_check().await?;

        info!("Redis store initialized successfully");
        Ok(store)
    }

    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let Some(limit) = self.config.command_timeout else {
            return fut.await.map_err(RateLimitError::Redis);
        };

        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(RateLimitError::Redis),
            Err(_) => Err(RateLimitError::Storage(format!(
                "Redis {} timed out after {}ms",
                operation,
                limit.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl AttemptStore for RedisStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let key = self.config.key_for(key);
        self.with_timeout("GET", async move { conn.get::<_, Option<String>>(&key).await })
            .await
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let key = self.config.key_for(key);
        let value = value.to_string();

        match self.config.key_ttl {
            Some(ttl) => {
                let seconds = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
                self.with_timeout("SET", async move {
                    redis::pipe()
                        .atomic()
                        .set(&key, &value)
                        .ignore()
                        .expire(&key, seconds)
                        .ignore()
                        .query_async::<_, ()>(&mut conn)
                        .await
                })
                .await
            }
            None => {
                self.with_timeout("SET", async move { conn.set::<_, _, ()>(&key, &value).await })
                    .await
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let key = self.config.key_for(key);
        self.with_timeout("DEL", async move { conn.del::<_, ()>(&key).await })
            .await
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        self.with_timeout("PING", async move {
            redis::cmd("PING").query_async::<_, ()>(&mut conn).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.connection_timeout, Some(Duration::from_secs(5)));
        assert!(config.key_ttl.is_none());
    }

    #[test]
    fn test_key_prefix() {
        let config = RedisConfig::default();
        assert_eq!(config.key_for("rate_limit_pedidos"), "rate_limit_pedidos");

        let config = RedisConfig {
            key_prefix: "tienda".to_string(),
            ..Default::default()
        };
        assert_eq!(config.key_for("rate_limit_pedidos"), "tienda:rate_limit_pedidos");
        assert_eq!(
            config.key_for("rate_limit_pedidos:10.0.0.7"),
            "tienda:rate_limit_pedidos:10.0.0.7"
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let config = RedisConfig {
            url: "not a redis url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RedisStore::new(config).await,
            Err(RateLimitError::Redis(_))
        ));
    }
}
