//! Wire protocol.
//!
//! Every frame is a JSON envelope `{"event": <name>, "data": <payload>}`.
//! Inbound frames decode into the closed set [`ClientEvent`]; anything else is
//! rejected with a [`ProtocolError`] at the transport boundary. Outbound
//! frames are [`ServerEvent`]s.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bulletin::{Bulletin, PostPayload};
use crate::errors::ProtocolError;
use crate::ids::ConnectionId;

/// Inbound event name for posting a bulletin.
pub const BULLETIN_POST: &str = "bulletin_post";
/// Outbound event name for a delivered bulletin.
pub const BULLETIN_RESPONSE: &str = "bulletin_response";
/// Lifecycle event name for a disconnect request / notice.
pub const DISCONNECT: &str = "disconnect";
/// Inbound event name for putting a username on the roster.
pub const JOIN: &str = "join";
/// Inbound event name for taking this connection's username off the roster.
pub const LEAVE: &str = "leave";
/// Inbound event name for listing the roster.
pub const LIST_USERS: &str = "list_users";

/// Events a client may send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// `bulletin_post`: publish a bulletin to every open connection.
    Post(PostPayload),
    /// `disconnect`: ask the server to flush and close this connection.
    Disconnect,
    /// `join`: bind a username to this connection.
    Join(JoinPayload),
    /// `leave`: release this connection's username.
    Leave,
    /// `list_users`: ask for the usernames of open connections.
    ListUsers,
}

/// Raw `join` payload. The username is checked by
/// [`validate_username`](crate::validation::validate_username).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinPayload {
    /// Requested display name.
    pub username: Option<String>,
}

/// One joined connection, as listed in `user_list`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Connection the name is bound to.
    pub connection_id: ConnectionId,
    /// Name given in `join`.
    pub username: String,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

        match envelope.event.as_str() {
            BULLETIN_POST => decode_data(envelope).map(Self::Post),
            JOIN => decode_data(envelope).map(Self::Join),
            DISCONNECT => Ok(Self::Disconnect),
            LEAVE => Ok(Self::Leave),
            LIST_USERS => Ok(Self::ListUsers),
            _ => Err(ProtocolError::UnknownEvent(envelope.event)),
        }
    }

    /// Decode a binary frame holding UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NonUtf8)?;
        Self::decode(text)
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Post(_) => BULLETIN_POST,
            Self::Disconnect => DISCONNECT,
            Self::Join(_) => JOIN,
            Self::Leave => LEAVE,
            Self::ListUsers => LIST_USERS,
        }
    }
}

/// Decode an envelope's payload; a missing payload reads as `{}`.
fn decode_data<T: DeserializeOwned>(envelope: Envelope) -> Result<T, ProtocolError> {
    let data = if envelope.data.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        envelope.data
    };
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        event: envelope.event,
        message: e.to_string(),
    })
}

/// Events the server sends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection admitted; carries its identity.
    #[serde(rename_all = "camelCase")]
    Connect {
        /// Server-assigned connection id.
        connection_id: ConnectionId,
    },
    /// Connection is being closed by the server.
    Disconnect {
        /// Short machine-readable reason.
        reason: String,
    },
    /// A bulletin delivered by the broadcast engine.
    BulletinResponse(Arc<Bulletin>),
    /// Sent to the poster only: the sequence its bulletin was accepted under.
    BulletinAck {
        /// Assigned sequence number.
        sequence: u64,
    },
    /// Sent to the poster only: why its frame was rejected.
    BulletinError {
        /// Human-readable reason.
        message: String,
    },
    /// Sent to the joiner only: the name now bound to its connection.
    Joined {
        /// Trimmed username.
        username: String,
    },
    /// Sent to the leaver only: the name it released.
    Left {
        /// Username that was bound.
        username: String,
    },
    /// Sent to the requester only: every open connection that has joined.
    UserList {
        /// Ordered by connection id.
        users: Vec<RosterEntry>,
    },
}

impl ServerEvent {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize server event");
            String::new()
        })
    }

    /// Encode a delivered bulletin.
    pub fn bulletin(bulletin: Arc<Bulletin>) -> Self {
        Self::BulletinResponse(bulletin)
    }
}
