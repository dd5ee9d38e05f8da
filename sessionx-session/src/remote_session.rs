//! Remote key-value session storage.
//!
//! Records are encoded with a [`SessionCodec`] and stored under
//! `namespace:id` with a native TTL. No local reaper runs: the remote
//! service expires keys on its own.

use crate::codec::{JsonCodec, SessionCodec};
use crate::config::{SessionBackend, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::traits::{SessionRecord, SessionStore, ensure_id, redact};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// The key-value commands the remote store relies on.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// `GET key`
    async fn get(&self, key: &str) -> SessionResult<Option<Vec<u8>>>;

    /// `SET key value EX ttl`
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SessionResult<()>;

    /// `EXPIRE key ttl`. A missing key is not an error.
    async fn expire(&self, key: &str, ttl: Duration) -> SessionResult<()>;

    /// `DEL key`. A missing key is not an error.
    async fn del(&self, key: &str) -> SessionResult<()>;

    /// Connectivity check.
    async fn ping(&self) -> SessionResult<()>;
}

#[cfg(feature = "redis")]
#[async_trait]
impl KvClient for sessionx_redis::RedisService {
    async fn get(&self, key: &str) -> SessionResult<Option<Vec<u8>>> {
        Ok(self.get_bytes(key).await?)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> SessionResult<()> {
        Ok(sessionx_redis::RedisService::set_ex(self, key, &value, ttl).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> SessionResult<()> {
        sessionx_redis::RedisService::expire(self, key, ttl).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> SessionResult<()> {
        self.delete(key).await?;
        Ok(())
    }

    async fn ping(&self) -> SessionResult<()> {
        Ok(self.health_check().await?)
    }
}

/// Session store backed by a remote key-value service.
///
/// Every call is bounded by [`SessionConfig::operation_timeout`]; a stalled
/// service surfaces as [`SessionError::BackendUnavailable`], never as a
/// missing session.
pub struct RemoteSessionStore<C> {
    client: Arc<C>,
    config: SessionConfig,
    codec: Arc<dyn SessionCodec>,
}

/// Remote store on top of the pooled Redis client.
#[cfg(feature = "redis")]
pub type RedisSessionStore = RemoteSessionStore<sessionx_redis::RedisService>;

#[cfg(feature = "redis")]
impl RemoteSessionStore<sessionx_redis::RedisService> {
    /// Connect to Redis using `config.redis` and verify connectivity.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sessionx_session::{RedisSessionStore, SessionConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = SessionConfig::redis("redis://localhost:6379")?;
    /// let store = RedisSessionStore::connect(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: SessionConfig) -> SessionResult<Self> {
        let service = sessionx_redis::RedisService::new(config.redis.clone()).await?;
        let store = Self::new(service, config);
        store.ping().await?;
        Ok(store)
    }
}

impl<C: KvClient> RemoteSessionStore<C> {
    /// Create a store over `client` using the JSON codec.
    pub fn new(client: C, config: SessionConfig) -> Self {
        Self::from_shared(Arc::new(client), config)
    }

    /// Create a store over a client shared with other owners.
    pub fn from_shared(client: Arc<C>, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            codec: Arc::new(JsonCodec),
        }
    }

    /// Replace the record codec.
    pub fn with_codec(mut self, codec: impl SessionCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Check connectivity within the operation timeout.
    pub async fn ping(&self) -> SessionResult<()> {
        self.bounded("PING", self.client.ping()).await
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> SessionResult<T>
    where
        F: Future<Output = SessionResult<T>>,
    {
        let limit = self.config.operation_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = limit.as_millis() as u64, "Session backend timed out");
                Err(SessionError::BackendUnavailable(format!(
                    "{} timed out after {}ms",
                    op,
                    limit.as_millis()
                )))
            }
        }
    }

    async fn write(&self, record: &SessionRecord) -> SessionResult<()> {
        ensure_id(&record.id)?;
        let key = self.config.session_key(&record.id);

        let ttl = record.remaining_ttl();
        if ttl.is_zero() {
            debug!(session = redact(&record.id), "Record already expired, deleting key");
            return self.bounded("DEL", self.client.del(&key)).await;
        }

        let bytes = self.codec.encode(record)?;
        self.bounded("SET", self.client.set_ex(&key, bytes, ttl))
            .await?;
        trace!(session = redact(&record.id), ttl_ms = ttl.as_millis() as u64, "Stored session");
        Ok(())
    }
}

#[async_trait]
impl<C: KvClient> SessionStore for RemoteSessionStore<C> {
    async fn create(&self, record: &SessionRecord) -> SessionResult<()> {
        self.write(record).await
    }

    async fn read(&self, id: &str) -> SessionResult<SessionRecord> {
        ensure_id(id)?;
        let key = self.config.session_key(id);
        let timeout = self.config.timeout;

        let (bytes, ()) = self
            .bounded(
                "GET",
                futures::future::try_join(self.client.get(&key), self.client.expire(&key, timeout)),
            )
            .await?;

        let bytes = bytes.ok_or_else(|| SessionError::SessionNotFound(redact(id).to_string()))?;
        let mut record = self.codec.decode(&bytes)?;

        // The key's TTL is authoritative; the EXPIRE above already slid it.
        record.renew(timeout);
        Ok(record)
    }

    async fn update(&self, record: &SessionRecord) -> SessionResult<()> {
        self.write(record).await
    }

    async fn remove(&self, id: &str) -> SessionResult<()> {
        ensure_id(id)?;
        let key = self.config.session_key(id);
        self.bounded("DEL", self.client.del(&key)).await?;
        trace!(session = redact(id), "Removed session");
        Ok(())
    }

    fn backend(&self) -> SessionBackend {
        SessionBackend::Redis
    }
}
