//! Session configuration.

use crate::cookie::CookieTemplate;
use crate::error::{SessionError, SessionResult};
use crate::traits::SESSION_ID_LEN;
use std::time::Duration;

/// Shortest inbound id the manager will look up at all.
const MIN_ACCEPTED_ID_LEN: usize = 16;

/// Longest sliding timeout accepted.
const MAX_TIMEOUT: Duration = Duration::from_secs(86400 * 366);

/// Reaper never ticks faster than this.
const MIN_REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Session backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// In-process map with a background reaper
    Memory,
    /// Redis, expiry delegated to key TTLs
    Redis,
}

impl SessionBackend {
    /// Parse a backend name as used in `SESSION_BACKEND`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "memory" | "ram" => Some(Self::Memory),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }

    /// Lowercase backend name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

impl std::fmt::Display for SessionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session configuration.
///
/// Built once at startup, validated, then shared read-only by every request.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend type
    pub backend: SessionBackend,
    /// Key namespace; remote keys are `namespace:id`
    pub namespace: String,
    /// Sliding session lifetime
    pub timeout: Duration,
    /// Memory reaper period, `None` for `timeout / 2`
    pub reap_interval: Option<Duration>,
    /// Upper bound for one remote backend operation
    pub operation_timeout: Duration,
    /// Inbound cookie values shorter than this are ignored
    pub min_id_len: usize,
    /// Attributes of the session cookie
    pub cookie: CookieTemplate,
    /// Redis connection settings (only for Redis backend)
    #[cfg(feature = "redis")]
    pub redis: sessionx_redis::RedisConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            namespace: "session".to_string(),
            timeout: Duration::from_secs(30 * 60), // 30 minutes
            reap_interval: None,
            operation_timeout: Duration::from_secs(5),
            min_id_len: SESSION_ID_LEN,
            cookie: CookieTemplate::default(),
            #[cfg(feature = "redis")]
            redis: sessionx_redis::RedisConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create an in-memory session configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionx_session::{SessionBackend, SessionConfig};
    ///
    /// let config = SessionConfig::memory();
    /// assert_eq!(config.backend, SessionBackend::Memory);
    /// ```
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a Redis session configuration.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Examples
    ///
    /// ```
    /// use sessionx_session::SessionConfig;
    ///
    /// let config = SessionConfig::redis("redis://127.0.0.1:6379").unwrap();
    /// ```
    #[cfg(feature = "redis")]
    pub fn redis(url: &str) -> SessionResult<Self> {
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(SessionError::InvalidUrl(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }

        Ok(Self {
            backend: SessionBackend::Redis,
            redis: sessionx_redis::RedisConfig::new(url),
            ..Default::default()
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `SESSION_BACKEND`, `SESSION_TIMEOUT_SECS`, `SESSION_NAMESPACE`,
    /// `SESSION_COOKIE_NAME`, `SESSION_COOKIE_DOMAIN`, `SESSION_COOKIE_PATH`
    /// and `SESSION_COOKIE_SECURE`; Redis settings come from the `REDIS_*`
    /// variables. The result still has to pass [`validate`](Self::validate).
    pub fn from_env() -> SessionResult<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("SESSION_BACKEND") {
            config.backend = SessionBackend::from_name(&name).ok_or_else(|| {
                SessionError::Config(format!("unknown session backend {:?}", name))
            })?;
        }

        if let Ok(secs) = std::env::var("SESSION_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| SessionError::Config(format!("invalid SESSION_TIMEOUT_SECS {:?}", secs)))?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Ok(namespace) = std::env::var("SESSION_NAMESPACE") {
            config.namespace = namespace;
        }

        let mut cookie = CookieTemplate::default();
        if let Ok(name) = std::env::var("SESSION_COOKIE_NAME") {
            cookie = cookie.name(name);
        }
        if let Ok(domain) = std::env::var("SESSION_COOKIE_DOMAIN") {
            cookie = cookie.domain(domain);
        }
        if let Ok(path) = std::env::var("SESSION_COOKIE_PATH") {
            cookie = cookie.path(path);
        }
        if let Ok(secure) = std::env::var("SESSION_COOKIE_SECURE") {
            cookie = cookie.secure(secure == "1" || secure.eq_ignore_ascii_case("true"));
        }
        config.cookie = cookie;

        #[cfg(feature = "redis")]
        {
            config.redis = sessionx_redis::RedisConfig::from_env().build();
        }

        Ok(config)
    }

    /// Set the session namespace/prefix.
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Set the sliding session timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the memory reaper period.
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = Some(interval);
        self
    }

    /// Set the per-operation bound for remote calls.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the minimum inbound cookie value length.
    pub fn with_min_id_len(mut self, len: usize) -> Self {
        self.min_id_len = len;
        self
    }

    /// Replace the cookie template.
    pub fn with_cookie(mut self, cookie: CookieTemplate) -> Self {
        self.cookie = cookie;
        self
    }

    /// Set only the cookie name.
    pub fn with_cookie_name(mut self, name: &str) -> Self {
        self.cookie = self.cookie.name(name);
        self
    }

    /// Set Redis authentication credentials.
    #[cfg(feature = "redis")]
    pub fn with_auth(mut self, username: Option<&str>, password: &str) -> Self {
        self.redis.username = username.map(str::to_string);
        self.redis.password = Some(password.to_string());
        self
    }

    /// Set the Redis logical database.
    #[cfg(feature = "redis")]
    pub fn with_database(mut self, db: u8) -> Self {
        self.redis.database = Some(db);
        self
    }

    /// Set the Redis connection pool size.
    #[cfg(feature = "redis")]
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.redis.pool_size = size;
        self
    }

    /// Replace the Redis connection settings.
    #[cfg(feature = "redis")]
    pub fn with_redis_config(mut self, redis: sessionx_redis::RedisConfig) -> Self {
        self.redis = redis;
        self
    }

    /// Effective memory reaper period.
    pub fn reap_interval(&self) -> Duration {
        self.reap_interval
            .unwrap_or(self.timeout / 2)
            .max(MIN_REAP_INTERVAL)
    }

    /// Build the session key with namespace.
    pub fn session_key(&self, session_id: &str) -> String {
        format!("{}:{}", self.namespace, session_id)
    }

    /// Check the whole configuration.
    ///
    /// A failure here is meant to stop the process at startup.
    pub fn validate(&self) -> SessionResult<()> {
        if self.timeout.is_zero() {
            return Err(SessionError::Config("session timeout must be non-zero".to_string()));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(SessionError::Config(
                "session timeout must not exceed one year".to_string(),
            ));
        }
        if self.operation_timeout.is_zero() {
            return Err(SessionError::Config(
                "operation timeout must be non-zero".to_string(),
            ));
        }
        if self.namespace.is_empty() {
            return Err(SessionError::Config("namespace must not be empty".to_string()));
        }
        if self.min_id_len < MIN_ACCEPTED_ID_LEN {
            return Err(SessionError::Config(format!(
                "minimum id length must be at least {}",
                MIN_ACCEPTED_ID_LEN
            )));
        }
        self.cookie.validate()?;

        if self.backend == SessionBackend::Redis {
            #[cfg(feature = "redis")]
            self.redis.validate()?;

            #[cfg(not(feature = "redis"))]
            return Err(SessionError::Config(
                "Redis backend selected but the `redis` feature is disabled".to_string(),
            ));
        }

        Ok(())
    }
}
