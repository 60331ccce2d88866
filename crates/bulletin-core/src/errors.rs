//! Error taxonomy for the bulletin service.
//!
//! - [`ValidationError`]: malformed post; the post is dropped, nothing is broadcast
//! - [`ProtocolError`]: a frame that could not be decoded into a known event
//! - [`SlowConsumerDrop`]: a connection's queue overflowed (diagnostic, not fatal)
//! - [`BulletinError`]: top-level enum, adds `ResourceExhausted`, `NotJoined`
//!   and `Transport`
//!
//! Only `Transport` ever ends a session, and only the session it happened on.

use thiserror::Error;

use crate::ids::ConnectionId;

/// Why a `bulletin_post` payload was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Sender missing or blank after trimming.
    #[error("sender must not be empty")]
    EmptySender,
    /// Subject missing or blank after trimming.
    #[error("subject must not be empty")]
    EmptySubject,
    /// `join` without a usable username.
    #[error("username must not be empty")]
    EmptyUsername,
    /// Subject longer than the allowed number of characters.
    #[error("subject exceeds maximum length ({len} > {max})")]
    SubjectTooLong {
        /// Observed length in characters.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
}

/// A frame that could not be turned into a [`ClientEvent`](crate::ClientEvent).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not JSON, or not an `{"event": .., "data": ..}` envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// Envelope names an event outside the closed set.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    /// Known event, but its payload has the wrong shape.
    #[error("invalid payload for '{event}': {message}")]
    InvalidPayload {
        /// Event name from the envelope.
        event: String,
        /// Decoder message.
        message: String,
    },
    /// Binary frame that does not hold UTF-8 text.
    #[error("binary frame is not valid UTF-8")]
    NonUtf8,
}

/// Diagnostic recorded when a full outbound queue evicts its oldest bulletin.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("slow consumer {connection_id}: evicted bulletin #{evicted_sequence}")]
pub struct SlowConsumerDrop {
    /// Connection whose queue overflowed.
    pub connection_id: ConnectionId,
    /// Sequence of the bulletin that was evicted.
    pub evicted_sequence: u64,
}

/// Top-level error type.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BulletinError {
    /// Post payload failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Inbound frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Registry or queue allocation refused.
    #[error("resource exhausted: {resource} (limit {limit})")]
    ResourceExhausted {
        /// What ran out.
        resource: &'static str,
        /// Configured limit.
        limit: usize,
    },
    /// A connection lost history because it could not keep up.
    #[error(transparent)]
    SlowConsumer(#[from] SlowConsumerDrop),
    /// `leave` from a connection that never joined.
    #[error("connection has not joined")]
    NotJoined,
    /// Read or write failure on a connection's transport.
    #[error("transport error: {0}")]
    Transport(String),
}

impl BulletinError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::ResourceExhausted { .. } => "RESOURCE_EXHAUSTED",
            Self::SlowConsumer(_) => "SLOW_CONSUMER_DROP",
            Self::NotJoined => "NOT_JOINED",
            Self::Transport(_) => "TRANSPORT_ERROR",
        }
    }

    /// Whether the error closes the session it occurred on.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Build a transport error from anything displayable.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
