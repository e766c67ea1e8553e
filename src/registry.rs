//! Tracks known and currently-connected peers.
//!
//! Exclusively owns [`PeerInfo`] and the outbound writer handle for each
//! peer. The router only ever borrows a [`snapshot`](PeerRegistry::snapshot)
//! under a short critical section — it never retains writers.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::protocol::GossipEnvelope;

/// Outbound sink for framed envelopes bound for one peer.
pub type PeerWriter = mpsc::UnboundedSender<GossipEnvelope>;

#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub node_id: String,
    pub multiaddr: String,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub latency_ms: Option<u64>,
}

impl PeerInfo {
    pub fn new(node_id: impl Into<String>, multiaddr: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            multiaddr: multiaddr.into(),
            last_seen: Utc::now(),
            is_active: true,
            latency_ms: None,
        }
    }
}

struct Entry {
    info: PeerInfo,
    writer: PeerWriter,
}

struct Inner {
    peers: HashMap<String, Entry>,
}

/// `peer_id -> (PeerInfo, outbound writer)` map with atomic re-keying when a
/// placeholder endpoint key is replaced by a learned `node_id`.
pub struct PeerRegistry {
    inner: Mutex<Inner>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                peers: HashMap::new(),
            }),
        }
    }

    pub fn add(&self, peer_id: impl Into<String>, info: PeerInfo, writer: PeerWriter) {
        let peer_id = peer_id.into();
        self.inner
            .lock()
            .unwrap()
            .peers
            .insert(peer_id, Entry { info, writer });
    }

    /// Best-effort remove; the writer's receiver dropping is what actually
    /// closes the connection on the reader side.
    pub fn remove(&self, peer_id: &str) {
        self.inner.lock().unwrap().peers.remove(peer_id);
    }

    /// Consistent list of `(peer_id, writer)` for broadcast. Cloning the
    /// writers lets the caller fan out without holding the registry lock.
    pub fn snapshot(&self) -> Vec<(String, PeerWriter)> {
        self.inner
            .lock()
            .unwrap()
            .peers
            .iter()
            .map(|(id, e)| (id.clone(), e.writer.clone()))
            .collect()
    }

    pub fn get(&self, peer_id: &str) -> Option<PeerInfo> {
        self.inner
            .lock()
            .unwrap()
            .peers
            .get(peer_id)
            .map(|e| e.info.clone())
    }

    pub fn touch(&self, peer_id: &str) {
        if let Some(entry) = self.inner.lock().unwrap().peers.get_mut(peer_id) {
            entry.info.last_seen = Utc::now();
        }
    }

    /// Move the entry stored under `old_key` (a placeholder endpoint) to
    /// `new_key` (the learned `node_id`), updating `info.node_id` too.
    /// No-op if `old_key == new_key` or `old_key` is absent.
    pub fn rekey(&self, old_key: &str, new_key: &str) {
        if old_key == new_key {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(mut entry) = inner.peers.remove(old_key) {
            entry.info.node_id = new_key.to_string();
            inner.peers.insert(new_key.to_string(), entry);
        }
    }

    /// Remove peers with `last_seen < cutoff`; returns the removed ids.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<String> = inner
            .peers
            .iter()
            .filter(|(_, e)| e.info.last_seen < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            inner.peers.remove(id);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> PeerWriter {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn add_and_snapshot() {
        let registry = PeerRegistry::new();
        registry.add("peer-1", PeerInfo::new("peer-1", "127.0.0.1:4001"), writer());
        assert_eq!(registry.len(), 1);
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, "peer-1");
    }

    #[test]
    fn remove_drops_entry() {
        let registry = PeerRegistry::new();
        registry.add("peer-1", PeerInfo::new("peer-1", "127.0.0.1:4001"), writer());
        registry.remove("peer-1");
        assert!(registry.is_empty());
    }

    #[test]
    fn rekey_replaces_placeholder_with_real_node_id() {
        let registry = PeerRegistry::new();
        registry.add(
            "127.0.0.1:4001",
            PeerInfo::new("127.0.0.1:4001", "127.0.0.1:4001"),
            writer(),
        );
        registry.rekey("127.0.0.1:4001", "real-node-id");
        assert!(registry.get("127.0.0.1:4001").is_none());
        let info = registry.get("real-node-id").unwrap();
        assert_eq!(info.node_id, "real-node-id");
    }

    #[test]
    fn prune_older_than_removes_stale_peers_only() {
        let registry = PeerRegistry::new();
        let mut stale = PeerInfo::new("peer-stale", "a:1");
        stale.last_seen = Utc::now() - chrono::Duration::seconds(600);
        registry.add("peer-stale", stale, writer());
        registry.add("peer-fresh", PeerInfo::new("peer-fresh", "b:1"), writer());

        let removed = registry.prune_older_than(Utc::now() - chrono::Duration::seconds(300));
        assert_eq!(removed, vec!["peer-stale".to_string()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("peer-fresh").is_some());
    }

    #[test]
    fn touch_updates_last_seen() {
        let registry = PeerRegistry::new();
        let mut old = PeerInfo::new("peer-1", "a:1");
        old.last_seen = Utc::now() - chrono::Duration::seconds(100);
        registry.add("peer-1", old.clone(), writer());
        registry.touch("peer-1");
        let info = registry.get("peer-1").unwrap();
        assert!(info.last_seen > old.last_seen);
    }
}
