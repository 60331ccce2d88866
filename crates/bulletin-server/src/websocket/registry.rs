//! Authoritative set of live connections.
//!
//! Membership changes copy the map; readers take an `Arc` of the current
//! version, so a snapshot never reflects a partially applied change.

use std::collections::BTreeMap;
use std::sync::Arc;

use bulletin_core::{BulletinError, ConnectionId, RosterEntry};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::connection::Connection;

type ConnectionMap = BTreeMap<ConnectionId, Arc<Connection>>;

struct Versioned {
    version: u64,
    connections: Arc<ConnectionMap>,
}

/// A consistent, immutable view of the registry at one version.
#[derive(Clone)]
pub struct RegistrySnapshot {
    version: u64,
    connections: Arc<ConnectionMap>,
}

impl RegistrySnapshot {
    /// Registry version this view was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Connections currently `Open`, ordered by id.
    pub fn open_connections(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.connections.values().filter(|c| c.is_open())
    }

    /// Every registered connection, regardless of state.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Tracks which connections exist.
pub struct ConnectionRegistry {
    inner: RwLock<Versioned>,
    max_connections: usize,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    /// Create a registry admitting at most `max_connections`, each with an
    /// outbound queue of `queue_capacity`.
    pub fn new(max_connections: usize, queue_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Versioned {
                version: 0,
                connections: Arc::new(BTreeMap::new()),
            }),
            max_connections,
            queue_capacity,
        }
    }

    /// Admit a new connection with the default queue capacity.
    pub fn register(&self) -> Result<Arc<Connection>, BulletinError> {
        self.register_with_capacity(self.queue_capacity)
    }

    /// Admit a new connection with an explicit queue capacity.
    ///
    /// The returned connection is `Open` and visible to every snapshot
    /// taken afterwards.
    pub fn register_with_capacity(
        &self,
        capacity: usize,
    ) -> Result<Arc<Connection>, BulletinError> {
        if capacity == 0 {
            return Err(BulletinError::ResourceExhausted {
                resource: "outbound_queue",
                limit: 0,
            });
        }

        let connection = Arc::new(Connection::new(ConnectionId::new(), capacity));
        {
            let mut inner = self.inner.write();
            if inner.connections.len() >= self.max_connections {
                return Err(BulletinError::ResourceExhausted {
                    resource: "connections",
                    limit: self.max_connections,
                });
            }
            let _ = connection.open();
            let _ = Arc::make_mut(&mut inner.connections)
                .insert(connection.id.clone(), Arc::clone(&connection));
            inner.version += 1;
        }
        debug!(connection_id = %connection.id, "connection registered");
        Ok(connection)
    }

    /// Remove a connection and close it. Idempotent.
    ///
    /// Returns `true` if the connection was present.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            if !inner.connections.contains_key(id) {
                return false;
            }
            let removed = Arc::make_mut(&mut inner.connections).remove(id);
            inner.version += 1;
            removed
        };
        if let Some(connection) = removed {
            let _ = connection.close();
            debug!(connection_id = %id, "connection unregistered");
        }
        true
    }

    /// Consistent view of the registry.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.read();
        RegistrySnapshot {
            version: inner.version,
            connections: Arc::clone(&inner.connections),
        }
    }

    /// Look up a connection by id.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner.read().connections.get(id).cloned()
    }

    /// Bind `username` to a registered connection.
    ///
    /// Returns the name it replaces. Names need not be unique.
    pub fn join(&self, id: &ConnectionId, username: String) -> Result<Option<String>, BulletinError> {
        let connection = self
            .get(id)
            .ok_or_else(|| BulletinError::transport(format!("{id} is no longer registered")))?;
        info!(connection_id = %id, username = %username, "joined roster");
        Ok(connection.set_username(username))
    }

    /// Release the name bound to a connection.
    pub fn leave(&self, id: &ConnectionId) -> Result<String, BulletinError> {
        let username = self
            .get(id)
            .and_then(|connection| connection.take_username())
            .ok_or(BulletinError::NotJoined)?;
        info!(connection_id = %id, username = %username, "left roster");
        Ok(username)
    }

    /// Names bound to open connections, ordered by connection id.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.snapshot()
            .open_connections()
            .filter_map(|connection| {
                connection.username().map(|username| RosterEntry {
                    connection_id: connection.id.clone(),
                    username,
                })
            })
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
