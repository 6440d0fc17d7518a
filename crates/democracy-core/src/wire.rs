//! Democracy wire format — the JSON objects carried in UDP datagrams.
//!
//! Every datagram carries exactly one [`Chunk`]. Concatenating the payloads
//! of a complete chunk group in `counter` order yields one JSON-encoded
//! [`Message`].
//!
//! Chunk on the wire:
//!   {"chunk": <string>, "id": <string>, "total": <int>, "counter": <int>}
//!
//! Message on the wire:
//!   {"content": <string>, "candidate": <string>, "state": <string>,
//!    "id": <string>, "weight": <int>, "channels": [<string>]}
//!
//! The last three message fields are additive. A message carrying only
//! the first three still decodes (`id` falls back to `candidate`).

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── Role ──────────────────────────────────────────────────────────────────────

/// Leadership role of a node, as announced on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Initial state. Defers to a higher-ranked peer.
    #[default]
    Follower,
    /// Has announced itself and is waiting out the observation window.
    Candidate,
    /// Believes itself the highest-ranked node currently known.
    Leader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// Logical announcement envelope. Transient: exists only while being
/// encoded and fragmented, or after a group is reassembled and decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Application event text.
    pub content: String,

    /// Source address (`host:port`) of the node claiming authorship.
    pub candidate: String,

    /// Sender's role at the time of sending.
    pub state: Role,

    /// Sender's node id. Empty on the wire means "use `candidate`".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Sender's weight.
    #[serde(default)]
    pub weight: u64,

    /// Topics the sender subscribes to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
}

impl Message {
    /// Id of the sending node, falling back to its address for senders
    /// that do not stamp one.
    pub fn sender_id(&self) -> &str {
        if self.id.is_empty() {
            &self.candidate
        } else {
            &self.id
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::MessageDecode)
    }
}

// ── Chunk ─────────────────────────────────────────────────────────────────────

/// One fragment of a serialized [`Message`].
///
/// All chunks of one message share `group_id` and `total`; `index` runs
/// over `0..total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(rename = "chunk", with = "byte_string")]
    pub payload: Bytes,

    #[serde(rename = "id")]
    pub group_id: String,

    pub total: u32,

    #[serde(rename = "counter")]
    pub index: u32,
}

impl Chunk {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Decode one datagram and check the header invariants
    /// (`total > 0`, `index < total`).
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let chunk: Chunk = serde_json::from_slice(bytes).map_err(WireError::ChunkDecode)?;
        if chunk.total == 0 {
            return Err(WireError::ZeroTotal {
                group_id: chunk.group_id,
            });
        }
        if chunk.index >= chunk.total {
            return Err(WireError::IndexOutOfRange {
                group_id: chunk.group_id,
                index: chunk.index,
                total: chunk.total,
            });
        }
        Ok(chunk)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode: {0}")]
    Encode(serde_json::Error),
    #[error("malformed chunk: {0}")]
    ChunkDecode(serde_json::Error),
    #[error("malformed message: {0}")]
    MessageDecode(serde_json::Error),
    #[error("chunk group {group_id} declares zero total")]
    ZeroTotal { group_id: String },
    #[error("chunk group {group_id}: index {index} outside total {total}")]
    IndexOutOfRange {
        group_id: String,
        index: u32,
        total: u32,
    },
}

/// Serialize a byte payload as a JSON string with one code point per byte
/// (U+0000..=U+00FF). ASCII payloads come out unchanged; any other byte
/// survives the trip exactly.
mod byte_string {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s: String = bytes.iter().map(|&b| char::from(b)).collect();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut out = Vec::with_capacity(s.len());
        for c in s.chars() {
            let b = u8::try_from(u32::from(c)).map_err(|_| {
                serde::de::Error::custom(format!("code point U+{:04X} is not a byte", u32::from(c)))
            })?;
            out.push(b);
        }
        Ok(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message {
            content: "hi".to_string(),
            candidate: "127.0.0.1:12345".to_string(),
            state: Role::Leader,
            id: "node-a".to_string(),
            weight: 42,
            channels: vec!["alerts".to_string()],
        }
    }

    #[test]
    fn chunk_uses_compact_field_names() {
        let chunk = Chunk {
            payload: Bytes::from_static(b"{\""),
            group_id: "abc".to_string(),
            total: 3,
            index: 0,
        };
        let json: serde_json::Value = serde_json::from_slice(&chunk.encode().unwrap()).unwrap();
        assert_eq!(json["chunk"], "{\"");
        assert_eq!(json["id"], "abc");
        assert_eq!(json["total"], 3);
        assert_eq!(json["counter"], 0);
    }

    #[test]
    fn chunk_decodes_foreign_datagram() {
        let raw = br#"{"chunk":"nt","id":"Xy3","total":7,"counter":2}"#;
        let chunk = Chunk::decode(raw).unwrap();
        assert_eq!(&chunk.payload[..], b"nt");
        assert_eq!(chunk.group_id, "Xy3");
        assert_eq!(chunk.total, 7);
        assert_eq!(chunk.index, 2);
    }

    #[test]
    fn chunk_payload_preserves_high_bytes() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let chunk = Chunk {
            payload: Bytes::from(payload.clone()),
            group_id: "g".to_string(),
            total: 1,
            index: 0,
        };
        let back = Chunk::decode(&chunk.encode().unwrap()).unwrap();
        assert_eq!(&back.payload[..], &payload[..]);
    }

    #[test]
    fn chunk_rejects_code_point_above_byte_range() {
        let raw = r#"{"chunk":"ā","id":"g","total":1,"counter":0}"#;
        assert!(matches!(
            Chunk::decode(raw.as_bytes()),
            Err(WireError::ChunkDecode(_))
        ));
    }

    #[test]
    fn chunk_rejects_bad_header() {
        let zero = br#"{"chunk":"","id":"g","total":0,"counter":0}"#;
        assert!(matches!(Chunk::decode(zero), Err(WireError::ZeroTotal { .. })));

        let past_end = br#"{"chunk":"","id":"g","total":2,"counter":2}"#;
        assert!(matches!(
            Chunk::decode(past_end),
            Err(WireError::IndexOutOfRange { index: 2, total: 2, .. })
        ));
    }

    #[test]
    fn chunk_rejects_garbage() {
        assert!(matches!(
            Chunk::decode(b"not json"),
            Err(WireError::ChunkDecode(_))
        ));
    }

    #[test]
    fn message_encodes_base_fields_first() {
        let encoded = String::from_utf8(sample_message().encode().unwrap()).unwrap();
        assert!(encoded.starts_with(r#"{"content":"hi","candidate":"127.0.0.1:12345","state":"leader""#));
    }

    #[test]
    fn message_from_three_field_sender() {
        let raw = br#"{"content":"ev","candidate":"10.0.0.2:12345","state":"leader"}"#;
        let msg = Message::decode(raw).unwrap();
        assert_eq!(msg.state, Role::Leader);
        assert_eq!(msg.weight, 0);
        assert!(msg.channels.is_empty());
        assert_eq!(msg.sender_id(), "10.0.0.2:12345");
    }

    #[test]
    fn message_rejects_unknown_state() {
        let raw = br#"{"content":"ev","candidate":"x","state":"dictator"}"#;
        assert!(matches!(Message::decode(raw), Err(WireError::MessageDecode(_))));
    }

    #[test]
    fn role_display_matches_wire() {
        for role in [Role::Follower, Role::Candidate, Role::Leader] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{role}\""));
        }
    }
}
