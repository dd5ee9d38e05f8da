// sessionx - server-side HTTP sessions for Rust
//
// This library binds a server-side session record to a client cookie, with
// sliding expiry and either an in-process or a Redis store.

// Re-export the session layer
pub use sessionx_session::*;

// Re-export the Redis client
#[cfg(feature = "redis")]
pub use sessionx_redis;

/// Prelude module for convenient imports
pub mod prelude {
    pub use sessionx_session::prelude::*;

    #[cfg(feature = "redis")]
    pub use sessionx_redis::{RedisConfig, RedisService};
}
