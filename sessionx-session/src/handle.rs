//! Per-request session handle.
//!
//! A handle is opened once per inbound request. It resolves the session id
//! from the request cookie, falls back to a brand-new session when the id is
//! missing, malformed or unknown, and keeps the outbound `Set-Cookie`
//! directive in step with the record's expiry.
//!
//! Every operation re-reads the record from the store under the handle lock,
//! so the store's sliding expiry is applied on each access and concurrent
//! callers sharing one handle never lose each other's updates.

use crate::config::SessionConfig;
use crate::cookie::set_cookie_header;
use crate::error::{SessionError, SessionResult};
use crate::traits::{SessionRecord, SessionStore, generate_session_id, is_well_formed_id, redact};
use cookie::Cookie;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How the handle obtained its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// A new session was started for this request
    Created,
    /// The inbound cookie referred to a live session
    Loaded,
}

/// Access to one client's session for the duration of a request.
///
/// Cloning is cheap and clones share state, so a handle can be passed to
/// several tasks working on the same request.
///
/// # Examples
///
/// ```
/// use sessionx_session::{SessionConfig, SessionManager, SessionStatus};
///
/// # #[tokio::main]
/// # async fn main() -> sessionx_session::SessionResult<()> {
/// let manager = SessionManager::new(SessionConfig::memory()).await?;
///
/// // First request: no cookie yet.
/// let session = manager.begin(None).await?;
/// assert_eq!(session.status().await, SessionStatus::Created);
/// session.set("user_id", 42).await?;
/// let set_cookie = session.set_cookie_header().await;
///
/// // Second request presents the cookie it was given.
/// let cookie_header = set_cookie.split(';').next().unwrap_or_default();
/// let session = manager.begin(Some(cookie_header)).await?;
/// assert_eq!(session.status().await, SessionStatus::Loaded);
/// assert_eq!(session.get::<i32>("user_id").await?, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
    state: Mutex<HandleState>,
}

struct HandleState {
    record: SessionRecord,
    status: SessionStatus,
    cookie: Cookie<'static>,
    destroyed: bool,
}

impl SessionHandle {
    /// Resolve the session for `inbound_id`, starting a new one if needed.
    ///
    /// Unknown, expired and undecodable sessions are replaced silently. A
    /// backend that cannot be reached is reported as an error instead, so an
    /// outage is never mistaken for a logged-out client.
    pub(crate) async fn open(
        store: Arc<dyn SessionStore>,
        config: Arc<SessionConfig>,
        inbound_id: Option<&str>,
    ) -> SessionResult<Self> {
        let acceptable = |id: &str| id.len() >= config.min_id_len && is_well_formed_id(id);

        match inbound_id {
            Some(id) if acceptable(id) => match store.read(id).await {
                Ok(record) => {
                    debug!(session = redact(id), "Loaded session");
                    return Ok(Self::assemble(store, config, record, SessionStatus::Loaded));
                }
                Err(SessionError::SessionNotFound(_)) => {
                    debug!(session = redact(id), "Unknown or expired session, starting a new one");
                }
                Err(SessionError::Deserialization(e)) => {
                    warn!(session = redact(id), error = %e, "Discarding undecodable session");
                    discard(&store, id).await;
                }
                Err(e) => return Err(e),
            },
            Some(id) => {
                warn!(len = id.len(), "Ignoring malformed session cookie");
            }
            None => {}
        }

        let record = SessionRecord::new(generate_session_id(), config.timeout);
        create_detached(&store, &record).await?;
        debug!(session = redact(&record.id), "Created session");

        Ok(Self::assemble(store, config, record, SessionStatus::Created))
    }

    fn assemble(
        store: Arc<dyn SessionStore>,
        config: Arc<SessionConfig>,
        record: SessionRecord,
        status: SessionStatus,
    ) -> Self {
        let cookie = config.cookie.issue(&record.id, record.expires_at);
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                state: Mutex::new(HandleState {
                    record,
                    status,
                    cookie,
                    destroyed: false,
                }),
            }),
        }
    }

    /// Current session id.
    pub async fn id(&self) -> String {
        self.inner.state.lock().await.record.id.clone()
    }

    /// Whether this request started a new session.
    pub async fn status(&self) -> SessionStatus {
        self.inner.state.lock().await.status
    }

    /// Whether [`clean`](Self::clean) has been called.
    pub async fn is_destroyed(&self) -> bool {
        self.inner.state.lock().await.destroyed
    }

    /// Snapshot of the record as last seen by this handle.
    pub async fn record(&self) -> SessionRecord {
        self.inner.state.lock().await.record.clone()
    }

    /// Read a typed value.
    ///
    /// Fails with [`SessionError::KeyNotFound`] when the session has no such
    /// key, which is distinct from the session itself being gone.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> SessionResult<T> {
        let value = self.get_value(key).await?;
        serde_json::from_value(value).map_err(|e| SessionError::Deserialization(e.to_string()))
    }

    /// Read the raw JSON value stored under `key`.
    pub async fn get_value(&self, key: &str) -> SessionResult<serde_json::Value> {
        ensure_key(key)?;
        let mut state = self.inner.state.lock().await;
        self.inner.refresh(&mut state).await?;

        state
            .record
            .value(key)
            .cloned()
            .ok_or_else(|| SessionError::KeyNotFound(key.to_string()))
    }

    /// Store `value` under `key` and write the record through.
    pub async fn set<T: Serialize>(&self, key: &str, value: T) -> SessionResult<()> {
        ensure_key(key)?;
        let value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;

        let mut state = self.inner.state.lock().await;
        self.inner.refresh(&mut state).await?;
        state.record.data.insert(key.to_string(), value);
        self.inner.write(&state.record).await
    }

    /// Atomically replace the value under `key` with `f(current)`.
    ///
    /// The handle lock is held from the read to the write, so concurrent
    /// `modify` calls through clones of one handle are applied one after the
    /// other.
    pub async fn modify<T, F>(&self, key: &str, f: F) -> SessionResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> T,
    {
        ensure_key(key)?;
        let mut state = self.inner.state.lock().await;
        self.inner.refresh(&mut state).await?;

        let updated = f(state.record.get::<T>(key));
        state.record.set(key, &updated)?;
        self.inner.write(&state.record).await?;
        Ok(updated)
    }

    /// Delete `key` from the session. Removing an absent key succeeds.
    pub async fn remove(&self, key: &str) -> SessionResult<()> {
        ensure_key(key)?;
        let mut state = self.inner.state.lock().await;
        self.inner.refresh(&mut state).await?;

        if state.record.remove(key).is_some() {
            self.inner.write(&state.record).await?;
        }
        Ok(())
    }

    /// Delete the whole session from the store.
    ///
    /// The outbound cookie becomes a removal cookie and any further data
    /// operation fails with [`SessionError::SessionDestroyed`]. Cleaning twice
    /// is a no-op.
    pub async fn clean(&self) -> SessionResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.destroyed {
            return Ok(());
        }

        let store = Arc::clone(&self.inner.store);
        let id = state.record.id.clone();
        detached(async move { store.remove(&id).await }).await?;

        debug!(session = redact(&state.record.id), "Session cleaned");
        state.destroyed = true;
        state.record.clear();
        state.cookie = self.inner.config.cookie.removal();
        Ok(())
    }

    /// Move the session's data to a freshly generated id.
    ///
    /// The new record is stored before the old one is removed, and the
    /// outbound cookie switches only after both steps succeed. On failure the
    /// handle keeps its previous id and cookie, and a half-written new record
    /// is removed again on a best-effort basis. Returns the new id.
    pub async fn migrate(&self) -> SessionResult<String> {
        let mut state = self.inner.state.lock().await;
        self.inner.refresh(&mut state).await?;

        let old_id = state.record.id.clone();
        let migrated = state
            .record
            .migrate_to(generate_session_id(), self.inner.config.timeout);

        let store = Arc::clone(&self.inner.store);
        let new_record = migrated.clone();
        let stale_id = old_id.clone();
        detached(async move {
            store.create(&new_record).await.map_err(|e| {
                SessionError::MigrationFailed(format!("could not store new session: {}", e))
            })?;

            if let Err(e) = store.remove(&stale_id).await {
                if let Err(rollback) = store.remove(&new_record.id).await {
                    warn!(
                        session = redact(&new_record.id),
                        error = %rollback,
                        "Could not roll back migrated session"
                    );
                }
                return Err(SessionError::MigrationFailed(format!(
                    "could not remove old session: {}",
                    e
                )));
            }
            Ok(())
        })
        .await?;

        info!(from = redact(&old_id), to = redact(&migrated.id), "Session migrated");
        state.cookie = self
            .inner
            .config
            .cookie
            .issue(&migrated.id, migrated.expires_at);
        let new_id = migrated.id.clone();
        state.record = migrated;
        Ok(new_id)
    }

    /// The `Set-Cookie` directive to attach to the response.
    pub async fn response_cookie(&self) -> Cookie<'static> {
        self.inner.state.lock().await.cookie.clone()
    }

    /// [`response_cookie`](Self::response_cookie) rendered as a header value.
    pub async fn set_cookie_header(&self) -> String {
        set_cookie_header(&self.inner.state.lock().await.cookie)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("backend", &self.inner.store.backend())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Re-read the record, replacing it with a fresh session if it vanished,
    /// and re-issue the cookie for the renewed expiry.
    async fn refresh(&self, state: &mut HandleState) -> SessionResult<()> {
        if state.destroyed {
            return Err(SessionError::SessionDestroyed);
        }

        match self.store.read(&state.record.id).await {
            Ok(record) => state.record = record,
            Err(e @ (SessionError::SessionNotFound(_) | SessionError::Deserialization(_))) => {
                if let SessionError::Deserialization(_) = e {
                    discard(&self.store, &state.record.id).await;
                }
                warn!(
                    session = redact(&state.record.id),
                    "Session disappeared from the store, starting a new one"
                );
                let record = SessionRecord::new(generate_session_id(), self.config.timeout);
                create_detached(&self.store, &record).await?;
                state.record = record;
                state.status = SessionStatus::Created;
            }
            Err(e) => return Err(e),
        }

        state.cookie = self
            .config
            .cookie
            .issue(&state.record.id, state.record.expires_at);
        Ok(())
    }

    async fn write(&self, record: &SessionRecord) -> SessionResult<()> {
        let store = Arc::clone(&self.store);
        let record = record.clone();
        detached(async move { store.update(&record).await }).await
    }
}

async fn create_detached(store: &Arc<dyn SessionStore>, record: &SessionRecord) -> SessionResult<()> {
    let store = Arc::clone(store);
    let record = record.clone();
    detached(async move { store.create(&record).await }).await
}

/// Best-effort removal of a record that can no longer be used.
async fn discard(store: &Arc<dyn SessionStore>, id: &str) {
    let store = Arc::clone(store);
    let owned = id.to_string();
    if let Err(e) = detached(async move { store.remove(&owned).await }).await {
        warn!(session = redact(id), error = %e, "Could not remove undecodable session");
    }
}

/// Run a store write on its own task so that dropping the caller's future
/// cannot interrupt it.
async fn detached<T, F>(fut: F) -> SessionResult<T>
where
    F: Future<Output = SessionResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| SessionError::Internal(format!("session write task failed: {}", e)))?
}

fn ensure_key(key: &str) -> SessionResult<()> {
    if key.is_empty() {
        return Err(SessionError::InvalidArgument(
            "session key must not be empty".to_string(),
        ));
    }
    Ok(())
}
