//! Node: the façade-facing entry point that wires identity, store,
//! registry, router, and the transport plane together.
//!
//! Also hosts the process-wide singleton (§9's redesign of the source's
//! module-level mutable node handle): `init_node`/`get_node`/`shutdown_node`
//! behind an explicit, documented single-initialization contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::identity::Identity;
use crate::protocol::Topic;
use crate::registry::PeerRegistry;
use crate::router::{Handler, PubSubRouter};
use crate::store::MessageStore;
use crate::transport::ble::{BleRadio, BleTransport, NullBleRadio};
use crate::transport::ip::IpTransport;
use crate::transport::Transport;

/// Snapshot returned by [`Node::get_stats`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeStats {
    pub node_id: String,
    pub display_name: Option<String>,
    pub uptime_seconds: u64,
    pub connected_peers: usize,
    pub known_peers: usize,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub subscriptions: Vec<String>,
    pub ble_enabled: bool,
}

struct Counters {
    messages_sent: AtomicU64,
}

/// A running (or not-yet-started) mesh node.
pub struct Node {
    identity: Identity,
    config: NodeConfig,
    store: Arc<MessageStore>,
    registry: Arc<PeerRegistry>,
    router: Arc<PubSubRouter>,
    transports: Vec<Arc<dyn Transport>>,
    subscriptions: AsyncMutex<Vec<String>>,
    counters: Counters,
    started_at: Instant,
}

impl Node {
    /// Construct a node from `config`, without starting any background
    /// task. Use [`init_node`] to also install this as the process-wide
    /// singleton.
    pub fn new(config: NodeConfig, identity: Option<Identity>) -> Self {
        Self::with_ble_radio(config, identity, None)
    }

    /// Construct a node, injecting a concrete [`BleRadio`] when
    /// `config.enable_ble` is set. Falls back to [`NullBleRadio`] (BLE
    /// reports itself unavailable) if `enable_ble` is set but no radio is
    /// supplied.
    pub fn with_ble_radio(
        config: NodeConfig,
        identity: Option<Identity>,
        ble_radio: Option<Arc<dyn BleRadio>>,
    ) -> Self {
        let identity = identity.unwrap_or_else(|| Identity::generate(config.display_name.clone()));
        let store = Arc::new(MessageStore::new(config.store_capacity, config.seen_set_capacity));
        let registry = Arc::new(PeerRegistry::new());
        let router = Arc::new(PubSubRouter::new(identity.clone(), Arc::clone(&store), Arc::clone(&registry)));

        let ip_transport: Arc<dyn Transport> = Arc::new(IpTransport::new(
            identity.clone(),
            config.clone(),
            Arc::clone(&router),
            Arc::clone(&registry),
            Arc::clone(&store),
        ));

        let mut transports: Vec<Arc<dyn Transport>> = vec![ip_transport];
        if config.enable_ble {
            let radio = ble_radio.unwrap_or_else(|| Arc::new(NullBleRadio));
            transports.push(Arc::new(BleTransport::new(
                radio,
                Arc::clone(&router),
                Arc::clone(&registry),
            )));
        }

        Self {
            identity,
            config,
            store,
            registry,
            router,
            transports,
            subscriptions: AsyncMutex::new(Vec::new()),
            counters: Counters {
                messages_sent: AtomicU64::new(0),
            },
            started_at: Instant::now(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    /// Start every transport in the plane. If the IP transport fails to
    /// bind, the failure surfaces to the caller (§7); other transports
    /// failing to start are logged and the node continues without them.
    pub async fn start(&self) -> Result<(), NodeError> {
        info!(node_id = %self.identity.node_id, "starting node");
        for (i, transport) in self.transports.iter().enumerate() {
            match transport.start().await {
                Ok(()) => {}
                Err(e) if i == 0 => return Err(e), // IP transport is always index 0
                Err(e) => tracing::warn!(transport = transport.name(), error = %e, "transport failed to start"),
            }
        }
        Ok(())
    }

    /// Idempotent shutdown of every transport.
    pub async fn stop(&self) {
        info!(node_id = %self.identity.node_id, "stopping node");
        for transport in &self.transports {
            transport.stop().await;
        }
    }

    pub async fn subscribe(&self, topic: impl Into<String>, handler: Handler) {
        let topic = topic.into();
        self.subscriptions.lock().await.push(topic.clone());
        self.router.subscribe(topic, handler);
    }

    /// Publish `payload` on `topic`: produces the envelope (suppressing
    /// self-echo), then broadcasts it across every transport in the plane.
    pub async fn publish(&self, topic: impl Into<String>, payload: Value) {
        let envelope = self.router.publish(topic, payload);
        self.counters.messages_sent.fetch_add(1, Ordering::SeqCst);
        for transport in &self.transports {
            transport.broadcast(envelope.clone()).await;
        }
    }

    pub async fn get_stats(&self) -> NodeStats {
        NodeStats {
            node_id: self.identity.node_id.clone(),
            display_name: self.identity.display_name.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            connected_peers: self.registry.len(),
            known_peers: self.registry.len(),
            messages_sent: self.counters.messages_sent.load(Ordering::SeqCst),
            messages_received: self.router.messages_received(),
            subscriptions: self.subscriptions.lock().await.clone(),
            ble_enabled: self.config.enable_ble,
        }
    }

    pub fn get_peers(&self) -> Vec<crate::registry::PeerInfo> {
        self.registry
            .snapshot()
            .into_iter()
            .filter_map(|(id, _)| self.registry.get(&id))
            .collect()
    }
}

// ── Process-wide singleton ──────────────────────────────────────────────────

static NODE: OnceLock<AsyncMutex<Option<Arc<Node>>>> = OnceLock::new();

fn slot() -> &'static AsyncMutex<Option<Arc<Node>>> {
    NODE.get_or_init(|| AsyncMutex::new(None))
}

/// Construct a node, start it, and install it as the process-wide
/// singleton. Fails with [`NodeError::AlreadyInitialized`] if a node is
/// already installed — callers that want a second, independent node
/// should use [`Node::new`] directly instead of the singleton.
pub async fn init_node(
    identity: Option<Identity>,
    config: NodeConfig,
) -> Result<Arc<Node>, NodeError> {
    let mut guard = slot().lock().await;
    if guard.is_some() {
        return Err(NodeError::AlreadyInitialized);
    }
    let node = Arc::new(Node::new(config, identity));
    node.start().await?;
    *guard = Some(Arc::clone(&node));
    Ok(node)
}

/// Fetch the process-wide singleton installed by [`init_node`].
pub async fn get_node() -> Result<Arc<Node>, NodeError> {
    slot()
        .lock()
        .await
        .clone()
        .ok_or(NodeError::Uninitialized)
}

/// Stop and clear the process-wide singleton. A no-op if none is
/// installed.
pub async fn shutdown_node() -> Result<(), NodeError> {
    let mut guard = slot().lock().await;
    match guard.take() {
        Some(node) => {
            node.stop().await;
            Ok(())
        }
        None => Err(NodeError::Uninitialized),
    }
}

/// Reserved topic name (§9 open question: no producer exists for this
/// topic today — peer discovery happens at the UDP-beacon/TCP-dial layer,
/// not as a gossiped message).
pub const PEER_DISCOVERY_TOPIC: &str = "disaster/peer-discovery";

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NodeConfig {
        NodeConfig {
            listen_port: 0,
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn new_node_has_generated_identity() {
        let node = Node::new(config(), None);
        assert_eq!(node.identity().node_id.len(), crate::identity::NODE_ID_HEX_LEN);
    }

    #[tokio::test]
    async fn get_stats_reflects_subscriptions_and_ble_flag() {
        let node = Node::new(config(), None);
        node.subscribe("disaster/help-requests", Box::new(|_| {})).await;
        let stats = node.get_stats().await;
        assert_eq!(stats.subscriptions, vec!["disaster/help-requests".to_string()]);
        assert!(!stats.ble_enabled);
    }

    #[test]
    fn peer_discovery_topic_constant_matches_the_canonical_topic() {
        assert_eq!(PEER_DISCOVERY_TOPIC, Topic::PeerDiscovery.as_str());
    }
}
