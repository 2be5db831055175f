//! Table of live connections shared by the accept loop, connection tasks and the tick sweep.

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use log::info;
use parking_lot::RwLock;

/// Opaque identifier of a connection, unique within a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        ConnectionId(id)
    }
}

impl From<ConnectionId> for u64 {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// What the registry knows about a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Address of the remote peer.
    pub peer: SocketAddr,
    /// When the connection was registered.
    pub opened_at: Instant,
}

/// Connection table.
///
/// Only identities are stored here; session state stays with the task owning the connection.
/// Registration and removal take the write lock, lookups and sweeps the read lock.
#[derive(Debug, Default)]
pub struct Registry {
    seq: AtomicU64,
    connections: RwLock<HashMap<ConnectionId, ConnectionInfo>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection and returns its id.
    pub fn open(&self, peer: SocketAddr) -> ConnectionId {
        let id = ConnectionId(self.seq.fetch_add(1, Ordering::Relaxed) + 1);
        let info = ConnectionInfo {
            peer,
            opened_at: Instant::now(),
        };

        let mut connections = self.connections.write();
        connections.insert(id, info);
        if connections.len() % 100 == 0 {
            info!("total number of connections: {}", connections.len());
        }
        id
    }

    /// Removes a connection, returning what was known about it.
    pub fn close(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let mut connections = self.connections.write();
        let info = connections.remove(&id);
        if info.is_some() && connections.len() % 100 == 0 {
            info!("total number of connections: {}", connections.len());
        }
        info
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Calls `f` for every live connection while holding the read lock.
    ///
    /// `f` must not call back into [`Registry::open`] or [`Registry::close`].
    pub fn for_each(&self, mut f: impl FnMut(ConnectionId, &ConnectionInfo)) {
        for (id, info) in self.connections.read().iter() {
            f(*id, info);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn open_and_close() {
        let registry = Registry::new();
        let a = registry.open(peer());
        let b = registry.open(peer());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.close(a).unwrap().peer, peer());
        assert!(registry.close(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_sees_live_connections() {
        let registry = Registry::new();
        let ids: Vec<_> = (0..5).map(|_| registry.open(peer())).collect();
        registry.close(ids[2]);

        let mut seen = Vec::new();
        registry.for_each(|id, _| seen.push(id));
        seen.sort();

        let mut expected = ids.clone();
        expected.remove(2);
        assert_eq!(seen, expected);
    }

    #[test]
    fn concurrent_registration() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        let id = registry.open(peer());
                        registry.close(id);
                        registry.open(peer());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1000);
    }
}
