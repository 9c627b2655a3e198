use crate::connection::{ConnectionId, StopHandle};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Entry held in the connection table.
#[derive(Clone, Debug)]
pub struct ConnEntry {
    /// Remote address of the connection.
    pub peer: SocketAddr,
    /// Instant the connection was accepted.
    pub opened_at: Instant,
    /// Stops the connection's task.
    pub stop: StopHandle,
}

/// Concurrent id → connection table.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    entries: DashMap<ConnectionId, ConnEntry>,
}

impl ConnectionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, returning any entry previously held under `id`.
    pub fn insert(&self, id: ConnectionId, entry: ConnEntry) -> Option<ConnEntry> {
        self.entries.insert(id, entry)
    }

    /// Removes a connection from the table.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnEntry> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    /// Stops every registered connection and empties the table.
    ///
    /// Returns how many connections were stopped.
    pub fn stop_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.entries.iter().map(|e| *e.key()).collect();
        let mut stopped = 0;
        for id in ids {
            if let Some(entry) = self.remove(id) {
                entry.stop.stop();
                stopped += 1;
            }
        }
        stopped
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
