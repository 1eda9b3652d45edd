//! Shared key-value store backing the rate limiter.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Any failure to reach or use the shared store.
///
/// The limiter treats a timeout like a connection or protocol error and
/// counts locally instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("shared store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

impl StoreUnavailable {
    pub fn timed_out(after: Duration) -> Self {
        Self(format!("no response within {}ms", after.as_millis()))
    }
}

impl From<redis::RedisError> for StoreUnavailable {
    fn from(e: redis::RedisError) -> Self {
        Self(e.to_string())
    }
}

/// Key-value store with per-key expiry.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read the freshest value for `key`; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable>;

    /// Write `value` under `key`, expiring after `ttl_secs`.
    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreUnavailable>;
}

/// Redis-compatible shared store. Reads always go to the server.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreUnavailable> {
        let client = redis::Client::open(url)?;
        let mut connection = ConnectionManager::new(client).await?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await?;

        tracing::info!("Connected to shared rate-limit store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        let mut connection = self.connection.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut connection)
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreUnavailable> {
        let mut connection = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<()>(&mut connection)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let e = StoreUnavailable::timed_out(Duration::from_millis(250));
        assert_eq!(e.to_string(), "shared store unavailable: no response within 250ms");
    }

    #[tokio::test]
    async fn test_connect_to_invalid_url_fails() {
        let result = RedisStore::connect("not-a-redis-url").await;
        assert!(result.is_err());
    }
}
