//! Redis configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{RedisError, Result};

/// Largest pool the session layer accepts.
const MAX_POOL_SIZE: u32 = 100;

/// Highest logical database index on a stock Redis server.
const MAX_DATABASE: u8 = 15;

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// Minimum idle connections.
    pub min_idle: Option<u32>,
    /// Connection timeout.
    #[serde(with = "duration_secs", default = "default_connection_timeout")]
    pub connection_timeout: Duration,
    /// Upper bound for a single command, pool checkout included.
    #[serde(with = "duration_secs", default = "default_command_timeout")]
    pub command_timeout: Duration,
    /// Database number (0-15).
    pub database: Option<u8>,
    /// Username for Redis 6+ ACL.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Use TLS.
    pub tls: bool,
    /// Connection name (for CLIENT SETNAME).
    pub connection_name: Option<String>,
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 10,
            min_idle: Some(1),
            connection_timeout: default_connection_timeout(),
            command_timeout: default_command_timeout(),
            database: None,
            username: None,
            password: None,
            tls: false,
            connection_name: None,
        }
    }
}

impl RedisConfig {
    /// Create a new configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> RedisConfigBuilder {
        let mut builder = RedisConfigBuilder::new();

        if let Ok(url) = std::env::var("REDIS_URL") {
            builder = builder.url(url);
        }

        if let Ok(pool_size) = std::env::var("REDIS_POOL_SIZE")
            && let Ok(size) = pool_size.parse() {
                builder = builder.pool_size(size);
            }

        if let Ok(db) = std::env::var("REDIS_DATABASE")
            && let Ok(db_num) = db.parse() {
                builder = builder.database(db_num);
            }

        if let Ok(secs) = std::env::var("REDIS_COMMAND_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse() {
                builder = builder.command_timeout(Duration::from_secs(secs));
            }

        if let Ok(username) = std::env::var("REDIS_USERNAME") {
            builder = builder.username(username);
        }

        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            builder = builder.password(password);
        }

        if std::env::var("REDIS_TLS").is_ok() {
            builder = builder.tls(true);
        }

        builder
    }

    /// Check the configuration before any connection is attempted.
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(RedisError::Config(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }

        let parsed = Url::parse(&self.url)
            .map_err(|e| RedisError::Config(format!("invalid Redis URL: {}", e)))?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(RedisError::Config("Redis URL has no host".to_string()));
        }

        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(RedisError::Config(format!(
                "pool size must be within 1..={}, got {}",
                MAX_POOL_SIZE, self.pool_size
            )));
        }

        if let Some(min_idle) = self.min_idle
            && min_idle > self.pool_size {
                return Err(RedisError::Config(
                    "min_idle cannot exceed pool_size".to_string(),
                ));
            }

        if let Some(db) = self.database
            && db > MAX_DATABASE {
                return Err(RedisError::Config(format!(
                    "database index must be within 0..={}, got {}",
                    MAX_DATABASE, db
                )));
            }

        if self.command_timeout.is_zero() || self.connection_timeout.is_zero() {
            return Err(RedisError::Config("timeouts must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Get the full Redis URL with auth and database.
    pub fn connection_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| RedisError::Config(format!("invalid Redis URL: {}", e)))?;

        if let Some(password) = &self.password {
            // Redis 6+ ACL format is user:pass@host, legacy is :pass@host
            if let Some(username) = &self.username {
                url.set_username(username)
                    .map_err(|_| RedisError::Config("cannot set username".to_string()))?;
            }
            url.set_password(Some(password))
                .map_err(|_| RedisError::Config("cannot set password".to_string()))?;
        }

        if let Some(db) = self.database {
            url.set_path(&format!("/{}", db));
        }

        Ok(url.to_string())
    }
}

/// Builder for Redis configuration.
#[derive(Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RedisConfig::default(),
        }
    }

    /// Set the Redis URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the minimum idle connections.
    pub fn min_idle(mut self, min_idle: u32) -> Self {
        self.config.min_idle = Some(min_idle);
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the database number.
    pub fn database(mut self, db: u8) -> Self {
        self.config.database = Some(db);
        self
    }

    /// Set the username (Redis 6+ ACL).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Enable TLS.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.config.tls = enabled;
        if enabled && self.config.url.starts_with("redis://") {
            self.config.url = self.config.url.replacen("redis://", "rediss://", 1);
        }
        self
    }

    /// Set the connection name.
    pub fn connection_name(mut self, name: impl Into<String>) -> Self {
        self.config.connection_name = Some(name.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RedisConfig {
        self.config
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RedisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_bad_scheme() {
        let config = RedisConfig::new("http://127.0.0.1:6379");
        assert!(matches!(config.validate(), Err(RedisError::Config(_))));
    }

    #[test]
    fn test_rejects_pool_size_out_of_range() {
        let config = RedisConfig::builder().pool_size(0).build();
        assert!(config.validate().is_err());

        let config = RedisConfig::builder().pool_size(101).build();
        assert!(config.validate().is_err());

        let config = RedisConfig::builder().pool_size(100).min_idle(1).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_database_out_of_range() {
        let config = RedisConfig::builder().database(16).build();
        assert!(config.validate().is_err());

        let config = RedisConfig::builder().database(15).build();
        assert!(config.validate().is_ok());
    }

    // The only test in this crate that touches the process environment.
    #[test]
    fn test_from_env() {
        let vars = [
            ("REDIS_URL", "redis://cache.internal:6380"),
            ("REDIS_POOL_SIZE", "4"),
            ("REDIS_DATABASE", "3"),
            ("REDIS_COMMAND_TIMEOUT_SECS", "9"),
        ];
        // SAFETY: no other test in this crate reads or writes these variables.
        unsafe {
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
        }
        let config = RedisConfig::from_env().build();
        unsafe {
            for (key, _) in vars {
                std::env::remove_var(key);
            }
        }

        assert_eq!(config.url, "redis://cache.internal:6380");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.database, Some(3));
        assert_eq!(config.command_timeout, Duration::from_secs(9));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_url_with_password_and_db() {
        let config = RedisConfig::builder()
            .url("redis://127.0.0.1:6379")
            .password("s3cret")
            .database(2)
            .build();

        assert_eq!(
            config.connection_url().unwrap(),
            "redis://:s3cret@127.0.0.1:6379/2"
        );
    }

    #[test]
    fn test_connection_url_with_acl_user() {
        let config = RedisConfig::builder()
            .url("redis://cache.internal:6380")
            .username("app")
            .password("pw")
            .build();

        assert_eq!(
            config.connection_url().unwrap(),
            "redis://app:pw@cache.internal:6380"
        );
    }

    #[test]
    fn test_tls_rewrites_scheme() {
        let config = RedisConfig::builder()
            .url("redis://127.0.0.1:6379")
            .tls(true)
            .build();
        assert!(config.url.starts_with("rediss://"));
        assert!(config.tls);
    }

    #[test]
    fn test_deserialize_timeouts_as_seconds() {
        let json = r#"{
            "url": "redis://127.0.0.1:6379",
            "pool_size": 8,
            "min_idle": null,
            "command_timeout": 3,
            "database": 1,
            "username": null,
            "password": null,
            "tls": false,
            "connection_name": null
        }"#;

        let config: RedisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.command_timeout, Duration::from_secs(3));
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert_eq!(config.pool_size, 8);
    }
}
