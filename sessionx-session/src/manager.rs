//! Session manager: owns the configuration and the store.

use crate::config::{SessionBackend, SessionConfig};
use crate::error::SessionResult;
use crate::handle::SessionHandle;
use crate::memory_session::MemorySessionStore;
use crate::traits::SessionStore;
use std::sync::Arc;
use tracing::info;

/// Entry point of the session layer.
///
/// Build one manager at startup and share it (it is cheap to clone) with
/// every request handler. Construction validates the configuration and, for
/// Redis, checks connectivity; callers are expected to abort startup when it
/// fails.
///
/// # Examples
///
/// ```
/// use sessionx_session::{SessionConfig, SessionManager};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> sessionx_session::SessionResult<()> {
/// let config = SessionConfig::memory()
///     .with_timeout(Duration::from_secs(3600))
///     .with_cookie_name("sid");
/// let manager = SessionManager::new(config).await?;
///
/// let session = manager.begin(Some("sid=not-a-valid-session")).await?;
/// session.set("theme", "dark").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<SessionConfig>,
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    /// Validate `config` and construct the backend it selects.
    pub async fn new(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;

        let store: Arc<dyn SessionStore> = match config.backend {
            SessionBackend::Memory => Arc::new(MemorySessionStore::new(config.clone())),
            #[cfg(feature = "redis")]
            SessionBackend::Redis => {
                Arc::new(crate::remote_session::RedisSessionStore::connect(config.clone()).await?)
            }
            #[cfg(not(feature = "redis"))]
            SessionBackend::Redis => {
                return Err(crate::error::SessionError::Config(
                    "Redis backend requires the `redis` feature".to_string(),
                ));
            }
        };

        Ok(Self::assemble(config, store))
    }

    /// Use a caller-provided store instead of the one `config` selects.
    pub fn with_store(config: SessionConfig, store: Arc<dyn SessionStore>) -> SessionResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, store))
    }

    fn assemble(config: SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        info!(
            backend = %store.backend(),
            timeout_secs = config.timeout.as_secs(),
            cookie = config.cookie.cookie_name(),
            "Session manager ready"
        );
        Self {
            config: Arc::new(config),
            store,
        }
    }

    /// Open the session for a request given its raw `Cookie` header.
    pub async fn begin(&self, cookie_header: Option<&str>) -> SessionResult<SessionHandle> {
        let id = cookie_header.and_then(|header| self.config.cookie.extract(header));
        self.begin_with_id(id.as_deref()).await
    }

    /// Open the session for an id already taken from the request.
    pub async fn begin_with_id(&self, id: Option<&str>) -> SessionResult<SessionHandle> {
        SessionHandle::open(Arc::clone(&self.store), Arc::clone(&self.config), id).await
    }

    /// The shared configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("backend", &self.store.backend())
            .field("timeout", &self.config.timeout)
            .field("cookie", &self.config.cookie.cookie_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::handle::SessionStatus;
    use crate::traits::generate_session_id;
    use std::time::Duration;

    fn cookie_pair(set_cookie: &str) -> String {
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = SessionConfig::memory().with_timeout(Duration::ZERO);
        assert!(matches!(
            SessionManager::new(config).await,
            Err(SessionError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_round_trip_through_cookie_header() {
        let manager = SessionManager::new(SessionConfig::memory()).await.unwrap();

        let first = manager.begin(None).await.unwrap();
        first.set("user", serde_json::json!({"id": 1})).await.unwrap();
        let header = format!("theme=dark; {}", cookie_pair(&first.set_cookie_header().await));

        let second = manager.begin(Some(&header)).await.unwrap();
        assert_eq!(second.status().await, SessionStatus::Loaded);
        assert_eq!(second.id().await, first.id().await);
        assert_eq!(second.get_value("user").await.unwrap()["id"], 1);
    }

    #[tokio::test]
    async fn test_custom_cookie_name() {
        let manager = SessionManager::new(SessionConfig::memory().with_cookie_name("sid"))
            .await
            .unwrap();
        let first = manager.begin(None).await.unwrap();
        let header = first.set_cookie_header().await;
        assert!(header.starts_with("sid="));

        // the default name is not recognised any more
        let id = first.id().await;
        let other = manager
            .begin(Some(&format!("session-id={}", id)))
            .await
            .unwrap();
        assert_eq!(other.status().await, SessionStatus::Created);
    }

    #[tokio::test]
    async fn test_stale_cookie_after_restart() {
        let id = generate_session_id();
        let manager = SessionManager::new(SessionConfig::memory()).await.unwrap();

        let handle = manager
            .begin(Some(&format!("session-id={}", id)))
            .await
            .unwrap();
        assert_eq!(handle.status().await, SessionStatus::Created);
        assert_ne!(handle.id().await, id);
    }

    #[tokio::test]
    async fn test_managers_are_independent() {
        let a = SessionManager::new(SessionConfig::memory()).await.unwrap();
        let b = SessionManager::new(SessionConfig::memory()).await.unwrap();

        let session = a.begin(None).await.unwrap();
        let id = session.id().await;
        let other = b.begin_with_id(Some(&id)).await.unwrap();
        assert_eq!(other.status().await, SessionStatus::Created);
    }

    #[tokio::test]
    async fn test_with_store_shares_backend() {
        let config = SessionConfig::memory();
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(config.clone()));
        let a = SessionManager::with_store(config.clone(), Arc::clone(&store)).unwrap();
        let b = SessionManager::with_store(config, store).unwrap();

        let session = a.begin(None).await.unwrap();
        session.set("n", 5).await.unwrap();
        let id = session.id().await;

        let same = b.begin_with_id(Some(&id)).await.unwrap();
        assert_eq!(same.get::<i32>("n").await.unwrap(), 5);
        assert_eq!(b.store().backend(), SessionBackend::Memory);
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn test_unreachable_redis_fails_startup() {
        let mut config = SessionConfig::redis("redis://127.0.0.1:1").unwrap();
        config.redis.min_idle = Some(0);
        config.redis.connection_timeout = Duration::from_millis(300);

        assert!(SessionManager::new(config).await.is_err());
    }
}
