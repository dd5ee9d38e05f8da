//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No live record under this id (absent or expired).
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The session exists but holds no value under this key.
    #[error("Key not found in session: {0}")]
    KeyNotFound(String),

    /// The storage backend could not be reached in time.
    #[error("Session backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The storage backend rejected a command for a reason other than connectivity.
    #[error("Session backend error: {0}")]
    Backend(String),

    /// Empty key, empty id or similar caller mistake. No backend call was made.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Identifier rotation did not complete; the previous session is still in effect.
    #[error("Session migration failed: {0}")]
    MigrationFailed(String),

    /// The handle was cleaned and can no longer be used.
    #[error("Session has been destroyed")]
    SessionDestroyed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Internal failure (e.g. a write task panicked)
    #[error("Session error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Whether the error means the session itself is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_))
    }
}

#[cfg(feature = "redis")]
impl From<sessionx_redis::RedisError> for SessionError {
    fn from(err: sessionx_redis::RedisError) -> Self {
        match err {
            sessionx_redis::RedisError::Config(msg) => Self::Config(msg),
            err if err.is_retryable() => Self::BackendUnavailable(err.to_string()),
            err => Self::Backend(err.to_string()),
        }
    }
}
