//! Inbound frame dispatch: decode, validate, then hand posts to the broadcast
//! engine and roster requests to the registry.

use std::sync::Arc;

use bulletin_core::{
    Bulletin, BulletinError, ClientEvent, ConnectionId, JoinPayload, ProtocolError, RosterEntry,
    ServerEvent, validate, validate_username,
};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::broadcast::{AcceptReceipt, BroadcastEngine};
use crate::metrics::BULLETINS_REJECTED_TOTAL;

/// Result of dispatching one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A post was validated and broadcast.
    Accepted(AcceptReceipt),
    /// The frame was refused; nothing was broadcast and no sequence consumed.
    Rejected(BulletinError),
    /// The frame named an event this server does not handle.
    Ignored(ProtocolError),
    /// The client asked to disconnect.
    DisconnectRequested,
    /// The connection joined the roster under `username`.
    Joined {
        /// Name now bound.
        username: String,
        /// Name it replaced, on a repeated `join`.
        replaced: Option<String>,
    },
    /// The connection released its roster name.
    Left(String),
    /// Current roster, for `list_users`.
    Roster(Vec<RosterEntry>),
}

impl DispatchOutcome {
    /// Frame to send back to the originating connection, if any.
    pub fn reply(&self) -> Option<ServerEvent> {
        match self {
            Self::Accepted(receipt) => Some(ServerEvent::BulletinAck {
                sequence: receipt.sequence,
            }),
            Self::Rejected(err) => Some(ServerEvent::BulletinError {
                message: err.to_string(),
            }),
            Self::Joined { username, .. } => Some(ServerEvent::Joined {
                username: username.clone(),
            }),
            Self::Left(username) => Some(ServerEvent::Left {
                username: username.clone(),
            }),
            Self::Roster(users) => Some(ServerEvent::UserList {
                users: users.clone(),
            }),
            Self::Ignored(_) | Self::DisconnectRequested => None,
        }
    }
}

/// Routes decoded client events to the validator, broadcast engine and
/// roster.
pub struct EventDispatcher {
    engine: Arc<BroadcastEngine>,
}

impl EventDispatcher {
    /// Create a dispatcher feeding the given engine.
    pub fn new(engine: Arc<BroadcastEngine>) -> Self {
        Self { engine }
    }

    /// Dispatch a text frame.
    pub fn dispatch_text(&self, origin: &ConnectionId, text: &str) -> DispatchOutcome {
        self.dispatch_decoded(origin, ClientEvent::decode(text))
    }

    /// Dispatch a binary frame holding UTF-8 JSON.
    pub fn dispatch_binary(&self, origin: &ConnectionId, bytes: &[u8]) -> DispatchOutcome {
        self.dispatch_decoded(origin, ClientEvent::decode_bytes(bytes))
    }

    fn dispatch_decoded(
        &self,
        origin: &ConnectionId,
        decoded: Result<ClientEvent, ProtocolError>,
    ) -> DispatchOutcome {
        match decoded {
            Ok(event) => self.dispatch(origin, event),
            Err(ProtocolError::UnknownEvent(name)) => {
                warn!(connection_id = %origin, event = %name, "ignoring unknown event");
                DispatchOutcome::Ignored(ProtocolError::UnknownEvent(name))
            }
            Err(err) => {
                warn!(connection_id = %origin, error = %err, "undecodable frame");
                reject(BulletinError::Protocol(err))
            }
        }
    }

    /// Dispatch an already-decoded event.
    #[instrument(skip_all, fields(connection_id = %origin, event = event.name()))]
    pub fn dispatch(&self, origin: &ConnectionId, event: ClientEvent) -> DispatchOutcome {
        match event {
            ClientEvent::Post(payload) => match validate(&payload) {
                Ok(bulletin) => {
                    let receipt = self.engine.accept(bulletin);
                    debug!(sequence = receipt.sequence, "post accepted");
                    DispatchOutcome::Accepted(receipt)
                }
                Err(err) => {
                    debug!(error = %err, "post rejected");
                    reject(BulletinError::Validation(err))
                }
            },
            ClientEvent::Disconnect => {
                debug!("disconnect requested");
                DispatchOutcome::DisconnectRequested
            }
            ClientEvent::Join(payload) => self.join(origin, &payload),
            ClientEvent::Leave => match self.engine.registry().leave(origin) {
                Ok(username) => DispatchOutcome::Left(username),
                Err(err) => reject(err),
            },
            ClientEvent::ListUsers => DispatchOutcome::Roster(self.engine.registry().roster()),
        }
    }

    fn join(&self, origin: &ConnectionId, payload: &JoinPayload) -> DispatchOutcome {
        let username = match validate_username(payload.username.as_deref()) {
            Ok(username) => username,
            Err(err) => return reject(BulletinError::Validation(err)),
        };
        match self.engine.registry().join(origin, username.clone()) {
            Ok(replaced) => DispatchOutcome::Joined { username, replaced },
            Err(err) => reject(err),
        }
    }

    /// The engine accepted posts go to.
    pub fn engine(&self) -> &Arc<BroadcastEngine> {
        &self.engine
    }
}

fn reject(err: BulletinError) -> DispatchOutcome {
    counter!(BULLETINS_REJECTED_TOTAL, "code" => err.code()).increment(1);
    DispatchOutcome::Rejected(err)
}

/// Encode a delivered bulletin as a `bulletin_response` text frame.
pub fn encode_bulletin(bulletin: &Arc<Bulletin>) -> String {
    ServerEvent::bulletin(Arc::clone(bulletin)).to_json()
}
