//! Fan-out broadcast to every connected peer.
//!
//! Uses a tokio broadcast channel for O(1) send to all subscribers. Each
//! connection holds an independent receiver buffering up to `capacity`
//! messages; a lagging connection drops oldest-first rather than stalling
//! the store.
//!
//! Delivery is deliberately unconditional: the originator of a mutation
//! receives its own confirmation like everyone else. Deduplication happens
//! at the mirror, which is idempotent by record id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{PeerInfo, ProtocolError, WireMessage};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Send-side stats tracked via atomics so `broadcast()` never takes a lock.
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// The board's single broadcast group.
///
/// All connections share one channel: there is exactly one shared map, so
/// there is no room routing. A mutation accepted by the record store is
/// encoded once and fanned out as `Arc<Vec<u8>>`.
pub struct BroadcastGroup {
    /// Broadcast channel sender
    sender: broadcast::Sender<Arc<Vec<u8>>>,

    /// Connected peers
    peers: Arc<RwLock<HashMap<Uuid, PeerInfo>>>,

    /// Channel capacity (messages buffered per receiver)
    capacity: usize,

    stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given per-receiver capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicBroadcastStats::default()),
        }
    }

    /// Register a peer and return its receiver.
    ///
    /// Subscribe *before* reading the snapshot that seeds the peer's mirror:
    /// a mutation concurrent with the connect then shows up in the snapshot,
    /// in the stream, or in both — never in neither.
    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut peers = self.peers.write().await;
        peers.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    /// Remove a peer from the registry.
    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        let mut peers = self.peers.write().await;
        peers.remove(peer_id)
    }

    /// Broadcast a message to all subscribed connections, sender included.
    ///
    /// The message is encoded once; receivers share the allocation. Returns
    /// the number of receivers the message reached. Safe to call while
    /// holding the store lock: nothing here awaits.
    pub fn broadcast(&self, msg: &WireMessage) -> Result<usize, ProtocolError> {
        let encoded = Arc::new(msg.encode()?);
        match self.sender.send(encoded) {
            Ok(count) => {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(count)
            }
            Err(_) => {
                // No live receivers; the message is gone.
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                Ok(0)
            }
        }
    }

    /// Number of registered peers.
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    /// All registered peer infos.
    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Whether a peer is registered.
    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    /// Broadcast statistics snapshot.
    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    /// Per-receiver buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe without registering a peer (tests, observers).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_remove_peer() {
        let group = BroadcastGroup::new(16);
        let peer = PeerInfo::new("Alice");
        let peer_id = peer.peer_id;

        let _rx = group.add_peer(peer).await;
        assert_eq!(group.peer_count().await, 1);
        assert!(group.has_peer(&peer_id).await);

        group.remove_peer(&peer_id).await;
        assert_eq!(group.peer_count().await, 0);
        assert!(!group.has_peer(&peer_id).await);
    }

    #[tokio::test]
    async fn test_fan_out_includes_originator() {
        let group = BroadcastGroup::new(16);

        let alice = PeerInfo::new("Alice");
        let bob = PeerInfo::new("Bob");

        let mut rx_alice = group.add_peer(alice.clone()).await;
        let mut rx_bob = group.add_peer(bob.clone()).await;

        // Alice's own delete confirmation reaches Alice too.
        let msg = WireMessage::deleted(alice.peer_id, 1, Uuid::new_v4());
        let count = group.broadcast(&msg).unwrap();
        assert_eq!(count, 2);

        let for_alice = rx_alice.recv().await.unwrap();
        let for_bob = rx_bob.recv().await.unwrap();
        assert_eq!(
            WireMessage::decode(&for_alice).unwrap().peer_id,
            alice.peer_id
        );
        assert_eq!(*for_alice, *for_bob);
    }

    #[tokio::test]
    async fn test_broadcast_without_receivers_is_dropped() {
        let group = BroadcastGroup::new(16);
        let count = group
            .broadcast(&WireMessage::ping(Uuid::new_v4()))
            .unwrap();
        assert_eq!(count, 0);

        let stats = group.stats().await;
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.messages_dropped, 1);
    }

    #[tokio::test]
    async fn test_stats_counting() {
        let group = BroadcastGroup::new(16);
        let peer = PeerInfo::new("Alice");
        let _rx = group.add_peer(peer.clone()).await;

        let msg = WireMessage::ping(peer.peer_id);
        group.broadcast(&msg).unwrap();
        group.broadcast(&msg).unwrap();

        let stats = group.stats().await;
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.active_peers, 1);
    }

    #[tokio::test]
    async fn test_delivery_order_matches_send_order() {
        let group = BroadcastGroup::new(64);
        let peer = PeerInfo::new("Alice");
        let mut rx = group.add_peer(peer.clone()).await;

        for seq in 1..=10u64 {
            let msg = WireMessage::deleted(peer.peer_id, seq, Uuid::new_v4());
            group.broadcast(&msg).unwrap();
        }

        for expected in 1..=10u64 {
            let bytes = rx.recv().await.unwrap();
            let msg = WireMessage::decode(&bytes).unwrap();
            assert_eq!(msg.seq, expected);
        }
    }
}
