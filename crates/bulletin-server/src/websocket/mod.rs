//! Connection management, broadcasting, event dispatch and session loops.

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod registry;
pub mod session;
