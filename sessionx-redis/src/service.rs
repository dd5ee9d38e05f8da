//! Redis service exposing the commands the session layer needs.

use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

use crate::{
    RedisConfig, RedisError, Result,
    pool::{RedisConnection, RedisPool, RedisPoolBuilder},
};

/// Redis service providing the connection pool and bounded commands.
///
/// Cloning is cheap: clones share the underlying pool.
#[derive(Clone)]
pub struct RedisService {
    config: RedisConfig,
    pool: RedisPool,
}

impl RedisService {
    /// Create a new Redis service.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = RedisPoolBuilder::new(config.clone()).build().await?;
        Ok(Self { config, pool })
    }

    /// Create from an existing pool.
    pub fn from_pool(config: RedisConfig, pool: RedisPool) -> Self {
        Self { config, pool }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// Get a connection from the pool.
    pub async fn get(&self) -> Result<RedisConnection<'_>> {
        Ok(self.pool.get().await?)
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> Result<()> {
        self.bounded("PING", async {
            let mut conn = self.get().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| RedisError::Connection(e.to_string()))?;
            Ok(())
        })
        .await
    }

    /// Get pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    /// Get a raw value.
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded("GET", async {
            let mut conn = self.get().await?;
            let value: Option<Vec<u8>> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    /// Set a value with expiration (`SET key value EX ttl`).
    pub async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let secs = ttl_secs(ttl);
        self.bounded("SET", async {
            let mut conn = self.get().await?;
            let _: () = conn.set_ex(key, value, secs).await?;
            Ok(())
        })
        .await
    }

    /// Set expiration on a key. Returns `false` when the key does not exist.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let secs = ttl_secs(ttl) as i64;
        self.bounded("EXPIRE", async {
            let mut conn = self.get().await?;
            let result: bool = conn.expire(key, secs).await?;
            Ok(result)
        })
        .await
    }

    /// Delete a key. Returns `false` when nothing was deleted.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded("DEL", async {
            let mut conn = self.get().await?;
            let deleted: u32 = conn.del(key).await?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Get TTL of a key.
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.bounded("TTL", async {
            let mut conn = self.get().await?;
            let ttl: i64 = conn.ttl(key).await?;
            if ttl < 0 {
                Ok(None)
            } else {
                Ok(Some(Duration::from_secs(ttl as u64)))
            }
        })
        .await
    }

    /// Run a command under `command_timeout`.
    async fn bounded<T, F>(&self, command: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        trace!(command, "Redis command");
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    command,
                    timeout_ms = self.config.command_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                Err(RedisError::Timeout)
            }
        }
    }
}

/// Whole seconds for a Redis TTL, rounded up and never below one.
///
/// `SET ... EX 0` is rejected by the server, and truncating a sub-second
/// remainder would expire a key earlier than its owner asked for.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// Connection pool statistics.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections.
    pub connections: u32,
    /// Idle connections.
    pub idle_connections: u32,
}
