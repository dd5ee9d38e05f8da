//! Session record and session store trait definition.

use crate::config::SessionBackend;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Random bytes behind every session id (384 bits).
const SESSION_ID_BYTES: usize = 48;

/// Length of a generated session id once base64url-encoded.
pub const SESSION_ID_LEN: usize = SESSION_ID_BYTES / 3 * 4;

/// One server-side session.
///
/// Records are plain data: cloning yields a fully independent copy, and two
/// records compare equal when they carry the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier
    pub id: String,
    /// Session data as key-value pairs
    pub data: HashMap<String, serde_json::Value>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last access timestamp
    pub last_accessed_at: DateTime<Utc>,
    /// Session expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create an empty record with the given ID and TTL.
    pub fn new(id: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            data: HashMap::new(),
            created_at: now,
            last_accessed_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or_default(),
        }
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Get a value from the session data.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw JSON value stored under `key`.
    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Set a value in the session data.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> SessionResult<()> {
        let json_value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.data.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Remove a value from the session data.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Check if a key exists in the session data.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Get all keys in the session data.
    pub fn keys(&self) -> Vec<&String> {
        self.data.keys().collect()
    }

    /// Clear all session data.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Update the last accessed timestamp.
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

    /// Slide the expiry to `now + ttl` and mark the record as accessed.
    pub fn renew(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.last_accessed_at = now;
        self.expires_at = now + chrono::Duration::from_std(ttl).unwrap_or_default();
    }

    /// Copy this record's data under a new id with a fresh expiry.
    ///
    /// The returned record owns its own `data` map; later changes to either
    /// record are not visible through the other.
    pub fn migrate_to(&self, new_id: impl Into<String>, ttl: Duration) -> Self {
        let mut record = Self::new(new_id, ttl);
        record.data = self.data.clone();
        record.created_at = self.created_at;
        record
    }
}

impl PartialEq for SessionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SessionRecord {}

/// Storage backend for session records.
///
/// Implementations must tolerate concurrent calls from many request tasks.
///
/// # Semantics
///
/// - [`create`](SessionStore::create) and [`update`](SessionStore::update)
///   both upsert: the record is stored under its id with its own
///   `expires_at`, whether or not the id was present before.
/// - [`read`](SessionStore::read) fails with
///   [`SessionError::SessionNotFound`] for absent or expired ids, and on
///   success slides the stored expiry forward by the store's timeout. The
///   returned record already carries the new `expires_at`.
/// - [`remove`](SessionStore::remove) is idempotent.
///
/// # Examples
///
/// ```ignore
/// use sessionx_session::{SessionRecord, SessionStore};
/// use std::time::Duration;
///
/// async fn example(store: &impl SessionStore) -> SessionResult<()> {
///     let mut record = SessionRecord::new(generate_session_id(), Duration::from_secs(1800));
///     record.set("user_id", 123)?;
///     store.create(&record).await?;
///
///     let loaded = store.read(&record.id).await?;
///     assert_eq!(loaded.get::<i32>("user_id"), Some(123));
///
///     store.remove(&record.id).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a brand-new record.
    async fn create(&self, record: &SessionRecord) -> SessionResult<()>;

    /// Load a live record by id, sliding its expiry.
    async fn read(&self, id: &str) -> SessionResult<SessionRecord>;

    /// Replace the stored payload and expiry of a record.
    async fn update(&self, record: &SessionRecord) -> SessionResult<()>;

    /// Delete a record. Deleting an unknown id succeeds.
    async fn remove(&self, id: &str) -> SessionResult<()>;

    /// Which backend this store is.
    fn backend(&self) -> SessionBackend;
}

/// Generate a new unique session ID.
///
/// 48 bytes from the thread-local CSPRNG, base64url-encoded without padding,
/// so every id is exactly [`SESSION_ID_LEN`] characters.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Whether `id` only uses the base64url alphabet that generated ids use.
///
/// Anything else (`:` in particular) never reaches a backend key.
pub(crate) fn is_well_formed_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Reject empty ids before any backend call.
pub(crate) fn ensure_id(id: &str) -> SessionResult<()> {
    if id.is_empty() {
        return Err(SessionError::InvalidArgument(
            "session id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Short prefix of an id, safe to put in logs.
pub(crate) fn redact(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_are_long_and_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 1000);
        for id in &ids {
            assert_eq!(id.len(), SESSION_ID_LEN);
            assert!(is_well_formed_id(id));
        }
    }

    #[test]
    fn test_well_formed_ids() {
        assert!(is_well_formed_id("abcXYZ019-_"));
        assert!(!is_well_formed_id(""));
        assert!(!is_well_formed_id("session:other:key"));
        assert!(!is_well_formed_id("abc def"));
        assert!(!is_well_formed_id("abc/def"));
        assert!(!is_well_formed_id("abc*"));
    }

    #[test]
    fn test_new_record_expiry() {
        let record = SessionRecord::new("abc", Duration::from_secs(60));
        assert!(!record.is_expired());
        assert!(record.remaining_ttl() > Duration::from_secs(55));
        assert!(record.data.is_empty());

        let expired = SessionRecord::new("abc", Duration::ZERO);
        assert!(expired.is_expired());
        assert_eq!(expired.remaining_ttl(), Duration::ZERO);
    }

    #[test]
    fn test_typed_values() {
        let mut record = SessionRecord::new("abc", Duration::from_secs(60));
        record.set("user_id", 42).unwrap();
        record.set("name", "alice").unwrap();

        assert_eq!(record.get::<i32>("user_id"), Some(42));
        assert_eq!(record.get::<String>("name"), Some("alice".to_string()));
        assert_eq!(record.get::<i32>("name"), None);
        assert!(record.contains("user_id"));
        assert_eq!(record.keys().len(), 2);

        assert!(record.remove("user_id").is_some());
        assert!(record.remove("user_id").is_none());

        record.clear();
        assert!(record.data.is_empty());
    }

    #[test]
    fn test_renew_slides_expiry() {
        let mut record = SessionRecord::new("abc", Duration::from_secs(1));
        let before = record.expires_at;
        record.renew(Duration::from_secs(600));
        assert!(record.expires_at > before);
        assert!(record.remaining_ttl() > Duration::from_secs(590));
    }

    #[test]
    fn test_migrate_to_copies_independently() {
        let mut old = SessionRecord::new("old", Duration::from_secs(60));
        old.set("cart", vec![1, 2, 3]).unwrap();

        let mut new = old.migrate_to("new", Duration::from_secs(120));
        assert_eq!(new.id, "new");
        assert_ne!(new, old);
        assert_eq!(new.data, old.data);
        assert_eq!(new.created_at, old.created_at);

        new.set("cart", vec![9]).unwrap();
        old.remove("cart");
        assert_eq!(new.get::<Vec<i32>>("cart"), Some(vec![9]));
        assert!(!old.contains("cart"));
    }

    #[test]
    fn test_equality_is_by_id() {
        let mut a = SessionRecord::new("same", Duration::from_secs(60));
        let b = SessionRecord::new("same", Duration::from_secs(5));
        a.set("k", "v").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_redact_and_ensure_id() {
        assert_eq!(redact("abcdefghijkl"), "abcdefgh");
        assert_eq!(redact("abc"), "abc");
        assert!(matches!(ensure_id(""), Err(SessionError::InvalidArgument(_))));
        assert!(ensure_id("x").is_ok());
    }
}
