//! The broadcast hub: one registry, one sequence, one dispatcher.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::websocket::broadcast::BroadcastEngine;
use crate::websocket::dispatcher::EventDispatcher;
use crate::websocket::registry::ConnectionRegistry;

/// Owns the components every session shares. Built once at server start.
pub struct BulletinHub {
    registry: Arc<ConnectionRegistry>,
    engine: Arc<BroadcastEngine>,
    dispatcher: EventDispatcher,
}

impl BulletinHub {
    /// Create a hub with the given connection limit and per-connection queue bound.
    pub fn new(max_connections: usize, queue_capacity: usize) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(max_connections, queue_capacity));
        let engine = Arc::new(BroadcastEngine::new(Arc::clone(&registry)));
        let dispatcher = EventDispatcher::new(Arc::clone(&engine));
        Self {
            registry,
            engine,
            dispatcher,
        }
    }

    /// Create a hub sized from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.max_connections, config.queue_capacity)
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Broadcast engine.
    pub fn engine(&self) -> &Arc<BroadcastEngine> {
        &self.engine
    }

    /// Inbound event dispatcher.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Registered connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Most recently assigned sequence.
    pub fn last_sequence(&self) -> u64 {
        self.engine.last_sequence()
    }
}
