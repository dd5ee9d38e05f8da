//! # sessionx Redis
//!
//! Pooled Redis client used by the sessionx remote session backend.
//!
//! ## Features
//!
//! - **Connection Pooling**: bounded pool managed by bb8
//! - **Bounded Commands**: every command (pool checkout included) is capped by
//!   `command_timeout`, so a stalled server surfaces as [`RedisError::Timeout`]
//! - **Session Primitives**: `GET`, `SET key value EX ttl`, `EXPIRE`, `DEL`, `PING`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sessionx_redis::{RedisConfig, RedisService};
//! use std::time::Duration;
//!
//! # async fn example() -> sessionx_redis::Result<()> {
//! let config = RedisConfig::builder()
//!     .url("redis://127.0.0.1:6379")
//!     .password("secret")
//!     .pool_size(10)
//!     .command_timeout(Duration::from_secs(3))
//!     .build();
//! config.validate()?;
//!
//! let redis = RedisService::new(config).await?;
//! redis.set_ex("session:abc", b"payload", Duration::from_secs(1800)).await?;
//! let value = redis.get_bytes("session:abc").await?;
//! assert_eq!(value.as_deref(), Some(&b"payload"[..]));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod pool;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{RedisConnection, RedisPool, RedisPoolBuilder};
pub use service::{PoolStats, RedisService};

// Re-export redis crate for convenience
pub use redis;

/// Prelude for common imports.
///
/// ```
/// use sessionx_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{RedisError, Result};
    pub use crate::service::RedisService;
}
