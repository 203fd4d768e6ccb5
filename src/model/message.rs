//! The raw message record as retrieved from a store.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::proto::PayloadReader;

use super::content::ContentType;

/// A single message as a conversation store hands it out.
///
/// Everything except `content_type` is immutable for the life of the
/// record. The content-type tag may be rewritten in place by a successful
/// action — a DELETE marks the record `Status` (soft delete) rather than
/// removing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Conversation this message belongs to.
    pub conversation_id: String,

    /// Sender account id. Absent for system-originated records.
    pub sender_id: Option<Uuid>,

    /// Client-assigned id, unique within the conversation but not
    /// globally ordered.
    pub client_message_id: i64,

    /// Server-assigned id; stable and strictly increasing within a
    /// conversation in fetch order.
    pub server_message_id: i64,

    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Opaque binary payload. Decoded on demand via [`RawMessage::reader`].
    #[serde(with = "content_base64")]
    pub content: Vec<u8>,

    /// Current content-type tag (see type-level doc on mutability).
    pub content_type: ContentType,
}

impl RawMessage {
    /// A zero-copy payload reader over this message's content.
    pub fn reader(&self) -> PayloadReader<'_> {
        PayloadReader::new(&self.content)
    }

    /// The message timestamp as a UTC datetime, if representable.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Payload bytes travel as base64 in serialized records so the JSON-lines
/// reference log stays line-oriented and diffable.
mod content_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
