//! Redis connection pool.

use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use tracing::{debug, info};
use url::Url;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

/// A connection checked out of [`RedisPool`].
///
/// Dereferences to the multiplexed connection, so `redis::AsyncCommands`
/// can be called on it directly.
pub type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Builder for creating Redis connection pools.
pub struct RedisPoolBuilder {
    config: RedisConfig,
    verify: bool,
}

impl RedisPoolBuilder {
    /// Create a new pool builder.
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            verify: true,
        }
    }

    /// Skip the startup handshake. Connections are then only opened on
    /// first use.
    pub fn lazy(mut self) -> Self {
        self.verify = false;
        self
    }

    /// Build the connection pool.
    ///
    /// Unless [`lazy`](Self::lazy) was called, the pool is only handed out
    /// after a `PING` round trip succeeds, so a misconfigured or unreachable
    /// server fails here rather than on the first request.
    pub async fn build(self) -> Result<RedisPool> {
        self.config.validate()?;

        let manager = RedisConnectionManager::new(self.config.connection_url()?)
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let min_idle = if self.verify { self.config.min_idle } else { None };
        let pool = Pool::builder()
            .max_size(self.config.pool_size)
            .min_idle(min_idle)
            .connection_timeout(self.config.connection_timeout)
            .build_unchecked(manager);

        if self.verify {
            tokio::time::timeout(self.config.connection_timeout, handshake(&pool, &self.config))
                .await
                .map_err(|_| RedisError::Timeout)??;
        }

        info!(
            pool_size = self.config.pool_size,
            host = %display_host(&self.config.url),
            verified = self.verify,
            "Redis connection pool created"
        );

        Ok(pool)
    }
}

/// Name the connection if configured, then `PING`.
async fn handshake(pool: &RedisPool, config: &RedisConfig) -> Result<()> {
    let mut conn = pool.get().await?;

    if let Some(name) = &config.connection_name {
        let _: () = redis::cmd("CLIENT")
            .arg("SETNAME")
            .arg(name)
            .query_async(&mut *conn)
            .await?;
    }

    let pong: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| RedisError::Connection(e.to_string()))?;
    debug!(reply = %pong, "Redis handshake complete");
    Ok(())
}

/// `host:port` of a Redis URL, without credentials.
fn display_host(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => "<unknown>".to_string(),
        },
        Err(_) => "<invalid>".to_string(),
    }
}
