//! # bulletin-core
//!
//! Shared vocabulary for the bulletin broadcast service:
//!
//! - **Branded IDs**: [`ConnectionId`] as a newtype for type safety
//! - **Data model**: [`PostPayload`] → [`ValidatedBulletin`] → sequenced [`Bulletin`]
//! - **Validation**: [`validate`] normalizes and checks inbound posts
//! - **Wire protocol**: [`ClientEvent`] / [`ServerEvent`] tagged frames
//! - **Errors**: [`BulletinError`] taxonomy via `thiserror`
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod bulletin;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod validation;

pub use bulletin::{Bulletin, PostDate, PostPayload, ValidatedBulletin};
pub use errors::{BulletinError, ProtocolError, SlowConsumerDrop, ValidationError};
pub use ids::ConnectionId;
pub use logging::{LogFormat, init_subscriber};
pub use protocol::{ClientEvent, JoinPayload, RosterEntry, ServerEvent};
pub use validation::{MAX_SUBJECT_LENGTH, validate, validate_username};
