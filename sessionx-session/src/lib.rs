//! Server-side sessions bound to an HTTP cookie.
//!
//! A [`SessionManager`] is built once at startup from a [`SessionConfig`]. For
//! every request it opens a [`SessionHandle`] from the inbound `Cookie`
//! header; the handle reads and writes the session through the selected
//! [`SessionStore`] and always carries the `Set-Cookie` directive the
//! response should send back.
//!
//! ## Behavior
//!
//! 1. **Sliding expiry** - every access pushes the deadline to `now + timeout`
//! 2. **Self-healing** - a missing, malformed or expired cookie starts a new
//!    session instead of failing the request
//! 3. **Outages are errors** - an unreachable backend is reported as
//!    [`SessionError::BackendUnavailable`], never as a fresh session
//! 4. **Fixation-safe rotation** - [`SessionHandle::migrate`] stores the new
//!    record before removing the old one and switching the cookie
//!
//! # Features
//!
//! - `redis` - Redis session storage (enabled by default)
//!
//! # Examples
//!
//! ## Memory Session Store
//!
//! ```
//! use sessionx_session::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let manager = SessionManager::new(SessionConfig::memory()).await?;
//!
//!     // Request without a cookie
//!     let session = manager.begin(None).await?;
//!     session.set("user_id", 123).await?;
//!
//!     // After login, rotate the id
//!     session.migrate().await?;
//!     let header = session.set_cookie_header().await;
//!     assert!(header.contains("HttpOnly"));
//!
//!     // Logout
//!     session.clean().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Redis Session Store (Default)
//!
//! ```no_run
//! use sessionx_session::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let config = SessionConfig::redis("redis://localhost:6379")?
//!         .with_namespace("myapp:session")
//!         .with_timeout(Duration::from_secs(3600));
//!
//!     let manager = SessionManager::new(config).await?;
//!     let session = manager.begin(Some("session-id=...")).await?;
//!     let user_id: i32 = session.get("user_id").await?;
//!     println!("User ID: {}", user_id);
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod cookie;
pub mod error;
pub mod handle;
pub mod manager;
pub mod memory_session;
pub mod remote_session;
pub mod traits;

pub use codec::{JsonCodec, SessionCodec};
pub use config::{SessionBackend, SessionConfig};
pub use crate::cookie::{CookieTemplate, DEFAULT_COOKIE_NAME, set_cookie_header};
pub use error::{SessionError, SessionResult};
pub use handle::{SessionHandle, SessionStatus};
pub use manager::SessionManager;
pub use memory_session::MemorySessionStore;
pub use remote_session::{KvClient, RemoteSessionStore};
pub use traits::{SESSION_ID_LEN, SessionRecord, SessionStore, generate_session_id};

#[cfg(feature = "redis")]
pub use remote_session::RedisSessionStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{SessionBackend, SessionConfig};
    pub use crate::cookie::CookieTemplate;
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::handle::{SessionHandle, SessionStatus};
    pub use crate::manager::SessionManager;
    pub use crate::memory_session::MemorySessionStore;
    pub use crate::remote_session::{KvClient, RemoteSessionStore};
    pub use crate::traits::{SessionRecord, SessionStore, generate_session_id};

    #[cfg(feature = "redis")]
    pub use crate::remote_session::RedisSessionStore;
}
