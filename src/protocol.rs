//! Wire message types for the relay protocol.
//!
//! Outbound (server → client) messages are plain serde types serialized as
//! `{"type": "...", ...}` JSON objects. Inbound frames are intentionally
//! *not* modeled as a deserializable enum: the session layer parses them
//! into [`serde_json::Value`] so that an unknown `type` can be echoed back
//! as `unknown-message-type` instead of being conflated with `invalid-json`,
//! and so field-level validation produces per-field reasons.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::identity::{coerce_name, normalize_display_name, normalize_presence_status};

/// Coarse presence status, visible to other room members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Lobby,
    Playing,
}

/// Presence metadata attached to every joined client. Only ever built
/// server-side; inbound metadata goes through [`Meta::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    pub name: String,
    pub status: Status,
}

impl Meta {
    /// Build metadata from a client-supplied JSON value, tolerating a
    /// missing, null, or malformed value. The resulting `name` is
    /// normalized but not yet room-unique; uniqueness is the allocator's
    /// concern.
    pub fn from_value(value: &Value) -> Self {
        Self {
            name: normalize_display_name(&coerce_name(value.get("name"))),
            status: normalize_presence_status(value.get("status").and_then(Value::as_str)),
        }
    }
}

/// One entry of the per-peer metadata snapshot in `welcome`.
#[derive(Debug, Clone, Serialize)]
pub struct PeerMetaEntry {
    pub id: String,
    pub meta: Meta,
}

/// Every message the server pushes to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome {
        id: String,
        app: String,
        room: String,
        peers: Vec<String>,
        #[serde(rename = "peerMeta")]
        peer_meta: Vec<PeerMetaEntry>,
        meta: Meta,
        #[serde(rename = "maxRoomSize")]
        max_room_size: usize,
    },
    PeerJoined {
        id: String,
        meta: Meta,
    },
    PeerLeft {
        id: String,
    },
    Signal {
        from: String,
        signal: Value,
    },
    Direct {
        from: String,
        payload: Value,
    },
    Broadcast {
        from: String,
        payload: Value,
    },
    MetaUpdated {
        id: String,
        meta: Meta,
    },
    PeerMeta {
        id: String,
        meta: Meta,
    },
    Pong {
        now: i64,
    },
    Error {
        reason: String,
        #[serde(rename = "maxRoomSize", skip_serializing_if = "Option::is_none")]
        max_room_size: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        received: Option<Value>,
    },
}

impl ServerMessage {
    /// Serialize for the wire. Server-built messages contain no
    /// non-serializable values, so failure is unreachable.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Why an inbound message was rejected. Every variant maps onto a wire
/// `error` reply addressed to the sender alone; none of them mutate state
/// or close the connection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Reject {
    #[error("invalid-json")]
    InvalidJson,
    #[error("join-required-first")]
    JoinRequiredFirst,
    #[error("invalid-app-or-room")]
    InvalidAppOrRoom,
    #[error("room-full")]
    RoomFull { max_room_size: usize },
    #[error("unknown-message-type")]
    UnknownMessageType { received: Value },
    #[error("missing-target")]
    MissingTarget,
    #[error("peer-not-found")]
    PeerNotFound,
    #[error("peer-outside-room")]
    PeerOutsideRoom,
    #[error("invalid-meta-patch")]
    InvalidMetaPatch,
}

impl From<Reject> for ServerMessage {
    fn from(reject: Reject) -> Self {
        let (max_room_size, received) = match &reject {
            Reject::RoomFull { max_room_size } => (Some(*max_room_size), None),
            Reject::UnknownMessageType { received } => (None, Some(received.clone())),
            _ => (None, None),
        };
        ServerMessage::Error {
            reason: reject.to_string(),
            max_room_size,
            received,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_value(msg: &ServerMessage) -> Value {
        serde_json::from_str(&msg.to_json()).unwrap()
    }

    #[test]
    fn test_welcome_wire_shape() {
        let msg = ServerMessage::Welcome {
            id: "c1".into(),
            app: "demo".into(),
            room: "r1".into(),
            peers: vec!["c0".into()],
            peer_meta: vec![PeerMetaEntry {
                id: "c0".into(),
                meta: Meta {
                    name: "Player".into(),
                    status: Status::Lobby,
                },
            }],
            meta: Meta {
                name: "Player483".into(),
                status: Status::Playing,
            },
            max_room_size: 8,
        };

        assert_eq!(
            as_value(&msg),
            json!({
                "type": "welcome",
                "id": "c1",
                "app": "demo",
                "room": "r1",
                "peers": ["c0"],
                "peerMeta": [{"id": "c0", "meta": {"name": "Player", "status": "lobby"}}],
                "meta": {"name": "Player483", "status": "playing"},
                "maxRoomSize": 8,
            })
        );
    }

    #[test]
    fn test_kebab_case_type_tags() {
        let left = ServerMessage::PeerLeft { id: "c0".into() };
        assert_eq!(as_value(&left)["type"], "peer-left");

        let updated = ServerMessage::MetaUpdated {
            id: "c0".into(),
            meta: Meta {
                name: "Alice".into(),
                status: Status::Lobby,
            },
        };
        assert_eq!(as_value(&updated)["type"], "meta-updated");
    }

    #[test]
    fn test_signal_passes_payload_through_unchanged() {
        let payload = json!({"sdp": {"kind": "offer", "body": "v=0"}, "n": [1, 2, 3]});
        let msg = ServerMessage::Signal {
            from: "c0".into(),
            signal: payload.clone(),
        };
        assert_eq!(as_value(&msg)["signal"], payload);
    }

    #[test]
    fn test_error_reply_extra_fields() {
        let full: ServerMessage = Reject::RoomFull { max_room_size: 4 }.into();
        assert_eq!(
            as_value(&full),
            json!({"type": "error", "reason": "room-full", "maxRoomSize": 4})
        );

        let unknown: ServerMessage = Reject::UnknownMessageType {
            received: json!("dance"),
        }
        .into();
        assert_eq!(
            as_value(&unknown),
            json!({"type": "error", "reason": "unknown-message-type", "received": "dance"})
        );

        let plain: ServerMessage = Reject::PeerNotFound.into();
        assert_eq!(
            as_value(&plain),
            json!({"type": "error", "reason": "peer-not-found"})
        );
    }

    #[test]
    fn test_meta_from_value_defaults() {
        let meta = Meta::from_value(&Value::Null);
        assert_eq!(meta.name, "Player");
        assert_eq!(meta.status, Status::Lobby);

        let meta = Meta::from_value(&json!({"name": "  Ali ce ", "status": "playing"}));
        assert_eq!(meta.name, "Ali ce");
        assert_eq!(meta.status, Status::Playing);
    }
}
