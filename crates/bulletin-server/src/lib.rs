//! # bulletin-server
//!
//! Axum HTTP + `WebSocket` server for the bulletin broadcast service.
//!
//! - `WebSocket` gateway: connection registry, per-connection sessions, heartbeat
//! - Broadcast engine: global sequence, non-blocking fan-out with drop-oldest queues
//! - Event dispatch: `bulletin_post` in, `bulletin_response` out
//! - HTTP endpoints: `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use hub::BulletinHub;
pub use server::BulletinServer;
