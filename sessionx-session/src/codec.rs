//! Byte encoding of session records for remote storage.

use crate::error::{SessionError, SessionResult};
use crate::traits::SessionRecord;

/// Turns a record into bytes and back.
pub trait SessionCodec: Send + Sync {
    /// Encode a record.
    fn encode(&self, record: &SessionRecord) -> SessionResult<Vec<u8>>;

    /// Decode bytes produced by [`encode`](SessionCodec::encode).
    fn decode(&self, bytes: &[u8]) -> SessionResult<SessionRecord>;
}

/// JSON codec (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SessionCodec for JsonCodec {
    fn encode(&self, record: &SessionRecord) -> SessionResult<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SessionResult<SessionRecord> {
        serde_json::from_slice(bytes).map_err(|e| SessionError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_json_codec_preserves_record() {
        let mut record = SessionRecord::new("abc", Duration::from_secs(60));
        record.set("user", serde_json::json!({"id": 7, "roles": ["admin"]})).unwrap();

        let bytes = JsonCodec.encode(&record).unwrap();
        let decoded = JsonCodec.decode(&bytes).unwrap();

        assert_eq!(decoded.id, "abc");
        assert_eq!(decoded.data, record.data);
        assert_eq!(decoded.expires_at, record.expires_at);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let err = JsonCodec.decode(b"\x00not json").unwrap_err();
        assert!(matches!(err, SessionError::Deserialization(_)));
    }
}
