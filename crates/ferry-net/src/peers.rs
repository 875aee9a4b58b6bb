//! Peer liveness registry.
//!
//! A separable component: the registry tracks known peers and when they were
//! last seen, and the daemon periodically probes the stale ones. Nothing in
//! the session or server flow depends on it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

/// A known remote peer.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Peer identifier.
    pub id: String,
    /// Dialable address, `host:port`.
    pub addr: String,
    /// Whether the last probe reached the peer.
    pub connected: bool,
    /// When the peer was last heard from or successfully probed.
    pub last_seen: Instant,
}

/// Capability interface for tracking peer liveness.
pub trait PeerDirectory: Send + Sync {
    /// Registers (or re-registers) a peer.
    fn add_peer(&self, id: &str, addr: &str);

    /// Forgets a peer.
    fn remove_peer(&self, id: &str);

    /// Records that the peer was just heard from.
    fn touch(&self, id: &str);

    /// Returns peers idle longer than `max_idle`.
    fn sweep_stale(&self, max_idle: Duration) -> Vec<Peer>;
}

/// In-memory peer registry.
#[derive(Default)]
pub struct InMemoryPeerRegistry {
    peers: RwLock<HashMap<String, Peer>>,
}

impl InMemoryPeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of a liveness probe.
    pub fn mark_connected(&self, id: &str, connected: bool) {
        let mut peers = self.peers.write();
        if let Some(peer) = peers.get_mut(id) {
            peer.connected = connected;
            if connected {
                peer.last_seen = Instant::now();
            }
        }
    }

    /// Returns a snapshot of a peer by ID.
    pub fn get(&self, id: &str) -> Option<Peer> {
        self.peers.read().get(id).cloned()
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl PeerDirectory for InMemoryPeerRegistry {
    fn add_peer(&self, id: &str, addr: &str) {
        let mut peers = self.peers.write();
        peers.insert(
            id.to_string(),
            Peer {
                id: id.to_string(),
                addr: addr.to_string(),
                connected: true,
                last_seen: Instant::now(),
            },
        );
        debug!(peer = %id, %addr, "peer added");
    }

    fn remove_peer(&self, id: &str) {
        self.peers.write().remove(id);
        debug!(peer = %id, "peer removed");
    }

    fn touch(&self, id: &str) {
        let mut peers = self.peers.write();
        if let Some(peer) = peers.get_mut(id) {
            peer.last_seen = Instant::now();
            peer.connected = true;
        }
    }

    fn sweep_stale(&self, max_idle: Duration) -> Vec<Peer> {
        let peers = self.peers.read();
        peers
            .values()
            .filter(|p| p.last_seen.elapsed() > max_idle)
            .cloned()
            .collect()
    }
}
