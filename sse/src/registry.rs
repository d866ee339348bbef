use crate::connection::{Connection, ConnectionId};
use log::*;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Concurrency-safe map from connection id to open connection.
///
/// The lock only ever covers map operations. Callers that need to write to
/// connections take a [`ConnectionRegistry::snapshot`] and write after the lock
/// is released, so a stalled client can never block registration or cleanup.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its own id
    pub fn add(&self, connection: Arc<Connection>) {
        let id = connection.id().clone();
        let previous = self.write().insert(id.clone(), connection);
        if let Some(previous) = previous {
            warn!(
                "Replaced existing SSE connection registered under {} ({:?})",
                id, previous
            );
        }
    }

    /// Unregister a connection. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.write().remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.read().get(id).cloned()
    }

    /// Point-in-time copy of every registered connection.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
