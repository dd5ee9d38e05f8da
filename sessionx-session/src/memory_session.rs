//! In-process session storage with a background reaper.

use crate::config::{SessionBackend, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::traits::{SessionRecord, SessionStore, ensure_id, redact};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

type SessionMap = Mutex<HashMap<String, SessionRecord>>;

/// Memory-backed session store.
///
/// All four operations and the reaper share one lock, and the reaper reads
/// the clock only after acquiring it. A renewal that gets the lock first is
/// therefore always seen by the sweep that follows, and a sweep never
/// observes a half-written record.
///
/// Sessions do not survive a process restart.
///
/// # Examples
///
/// ```
/// use sessionx_session::{MemorySessionStore, SessionConfig, SessionRecord, SessionStore};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> sessionx_session::SessionResult<()> {
/// let store = MemorySessionStore::new(SessionConfig::memory());
///
/// let mut record = SessionRecord::new("some-session-id", Duration::from_secs(60));
/// record.set("user_id", 7)?;
/// store.create(&record).await?;
///
/// let loaded = store.read("some-session-id").await?;
/// assert_eq!(loaded.get::<i32>("user_id"), Some(7));
/// # Ok(())
/// # }
/// ```
pub struct MemorySessionStore {
    sessions: Arc<SessionMap>,
    config: SessionConfig,
    reaper: CancellationToken,
}

impl MemorySessionStore {
    /// Create a new store and start its reaper.
    ///
    /// Must be called from within a Tokio runtime. The reaper wakes every
    /// [`SessionConfig::reap_interval`] and stops on
    /// [`shutdown`](Self::shutdown) or when the store is dropped.
    pub fn new(config: SessionConfig) -> Self {
        let sessions = Arc::new(Mutex::new(HashMap::new()));
        let reaper = CancellationToken::new();
        let interval = config.reap_interval();

        spawn_reaper(Arc::downgrade(&sessions), interval, reaper.clone());

        info!(
            timeout_secs = config.timeout.as_secs(),
            reap_interval_ms = interval.as_millis() as u64,
            "Memory session store started"
        );

        Self {
            sessions,
            config,
            reaper,
        }
    }

    /// Run one reaper pass now. Returns how many records were removed.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.sessions)
    }

    /// Number of records held, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Stop the background reaper. Foreground operations keep working and
    /// still refuse to return expired records.
    pub fn shutdown(&self) {
        self.reaper.cancel();
    }

    /// Whether the background reaper is still scheduled.
    pub fn is_reaping(&self) -> bool {
        !self.reaper.is_cancelled()
    }

    fn store(&self, record: &SessionRecord) -> SessionResult<()> {
        ensure_id(&record.id)?;
        let mut sessions = self.sessions.lock();
        sessions.insert(record.id.clone(), record.clone());
        trace!(session = redact(&record.id), "Stored session");
        Ok(())
    }
}

impl Drop for MemorySessionStore {
    fn drop(&mut self) {
        self.reaper.cancel();
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: &SessionRecord) -> SessionResult<()> {
        self.store(record)
    }

    async fn read(&self, id: &str) -> SessionResult<SessionRecord> {
        ensure_id(id)?;
        let mut sessions = self.sessions.lock();
        let now = Utc::now();

        match sessions.get_mut(id) {
            Some(record) if !record.is_expired_at(now) => {
                record.renew(self.config.timeout);
                Ok(record.clone())
            }
            Some(_) => {
                sessions.remove(id);
                debug!(session = redact(id), "Dropped expired session on read");
                Err(SessionError::SessionNotFound(redact(id).to_string()))
            }
            None => Err(SessionError::SessionNotFound(redact(id).to_string())),
        }
    }

    async fn update(&self, record: &SessionRecord) -> SessionResult<()> {
        self.store(record)
    }

    async fn remove(&self, id: &str) -> SessionResult<()> {
        ensure_id(id)?;
        if self.sessions.lock().remove(id).is_some() {
            trace!(session = redact(id), "Removed session");
        }
        Ok(())
    }

    fn backend(&self) -> SessionBackend {
        SessionBackend::Memory
    }
}

/// Delete every expired record. The clock is read under the lock.
fn sweep(sessions: &SessionMap) -> usize {
    let mut sessions = sessions.lock();
    let now = Utc::now();
    let before = sessions.len();
    sessions.retain(|_, record| !record.is_expired_at(now));
    before - sessions.len()
}

fn spawn_reaper(sessions: Weak<SessionMap>, interval: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(sessions) = sessions.upgrade() else {
                        break;
                    };
                    let removed = sweep(&sessions);
                    if removed > 0 {
                        debug!(removed, "Reaped expired sessions");
                    }
                }
            }
        }

        debug!("Session reaper stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::generate_session_id;

    fn expired_record(id: &str) -> SessionRecord {
        let mut record = SessionRecord::new(id, Duration::from_secs(60));
        record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        record
    }

    #[tokio::test]
    async fn test_create_read_update() {
        let store = MemorySessionStore::new(SessionConfig::memory());
        let id = generate_session_id();

        let mut record = SessionRecord::new(&id, Duration::from_secs(60));
        store.create(&record).await.unwrap();

        record.set("user", "alice").unwrap();
        store.update(&record).await.unwrap();

        let loaded = store.read(&id).await.unwrap();
        assert_eq!(loaded.get::<String>("user"), Some("alice".to_string()));
        assert_eq!(store.backend(), SessionBackend::Memory);
    }

    #[tokio::test]
    async fn test_update_upserts_unknown_id() {
        let store = MemorySessionStore::new(SessionConfig::memory());
        let record = SessionRecord::new("never-created", Duration::from_secs(60));

        store.update(&record).await.unwrap();
        assert!(store.read("never-created").await.is_ok());
    }

    #[tokio::test]
    async fn test_read_unknown_is_not_found() {
        let store = MemorySessionStore::new(SessionConfig::memory());
        let err = store.read("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_never_returns_expired_record() {
        let store = MemorySessionStore::new(SessionConfig::memory());
        store.create(&expired_record("stale")).await.unwrap();
        assert_eq!(store.len(), 1);

        let err = store.read("stale").await.unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));
        // lazily deleted
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_read_slides_expiry() {
        let config = SessionConfig::memory().with_timeout(Duration::from_secs(600));
        let store = MemorySessionStore::new(config);

        let record = SessionRecord::new("sliding", Duration::from_secs(5));
        store.create(&record).await.unwrap();

        let loaded = store.read("sliding").await.unwrap();
        assert!(loaded.expires_at > record.expires_at);
        assert!(loaded.remaining_ttl() > Duration::from_secs(590));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemorySessionStore::new(SessionConfig::memory());
        let record = SessionRecord::new("gone", Duration::from_secs(60));
        store.create(&record).await.unwrap();

        store.remove("gone").await.unwrap();
        store.remove("gone").await.unwrap();
        store.remove("never-existed").await.unwrap();
        assert!(store.read("gone").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let store = MemorySessionStore::new(SessionConfig::memory());
        assert!(matches!(
            store.read("").await,
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.remove("").await,
            Err(SessionError::InvalidArgument(_))
        ));
        let record = SessionRecord::new("", Duration::from_secs(60));
        assert!(matches!(
            store.create(&record).await,
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = MemorySessionStore::new(SessionConfig::memory());
        store.create(&expired_record("old-1")).await.unwrap();
        store.create(&expired_record("old-2")).await.unwrap();
        store
            .create(&SessionRecord::new("live", Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(store.sweep_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.read("live").await.is_ok());
    }

    #[tokio::test]
    async fn test_renewal_before_sweep_wins() {
        let config = SessionConfig::memory().with_timeout(Duration::from_secs(60));
        let store = MemorySessionStore::new(config);

        let record = SessionRecord::new("racy", Duration::from_millis(50));
        store.create(&record).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.read("racy").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.sweep_expired(), 0);
        assert!(store.read("racy").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_runs_on_interval() {
        let config = SessionConfig::memory().with_reap_interval(Duration::from_secs(10));
        let store = MemorySessionStore::new(config);

        store.create(&expired_record("a")).await.unwrap();
        store.create(&expired_record("b")).await.unwrap();
        assert_eq!(store.len(), 2);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_reaper() {
        let config = SessionConfig::memory().with_reap_interval(Duration::from_secs(10));
        let store = MemorySessionStore::new(config);
        assert!(store.is_reaping());

        store.shutdown();
        assert!(!store.is_reaping());

        store.create(&expired_record("kept")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.len(), 1);

        // foreground reads still enforce expiry
        assert!(store.read("kept").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers() {
        let store = Arc::new(MemorySessionStore::new(SessionConfig::memory()));

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut record = SessionRecord::new(format!("session-{i}"), Duration::from_secs(60));
                record.set("n", i).unwrap();
                store.create(&record).await.unwrap();
                store.read(&record.id).await.unwrap();
                if i % 2 == 0 {
                    store.remove(&record.id).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 32);
        let odd = store.read("session-7").await.unwrap();
        assert_eq!(odd.get::<i32>("n"), Some(7));
    }
}
