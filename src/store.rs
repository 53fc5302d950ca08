use async_trait::async_trait;
use moka::future::Cache;

use crate::error::Result;

/// Durable keyed storage that attempt records live in.
///
/// Values are opaque strings; the limiter owns their encoding. Every method
/// may fail, and the limiter treats failures as soft.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Fetch the raw value stored under `key`, if any
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing whatever was there
    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Health check for the backing store
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process store backed by a moka cache.
///
/// Records do not survive a restart. Once `max_capacity` keys are held the
/// least useful ones are evicted, which a limiter sees as "no record".
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, String>,
}

impl MemoryStore {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await)
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string()).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
