//! BLE transport (§4.6, optional).
//!
//! GATT peripheral/central internals are an external collaborator reached
//! only through the narrow [`BleRadio`] trait — this crate has no
//! dependency on a specific BLE stack. A host embedding this crate on a
//! real device supplies a `BleRadio` implementation backed by whatever
//! platform BLE library it uses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::protocol::{BleFrame, GossipEnvelope};
use crate::registry::{PeerInfo, PeerRegistry};
use crate::router::PubSubRouter;

use super::Transport;

/// Registry key for the single entry representing the whole BLE medium.
/// `BleRadio::broadcast_bytes` addresses every connected peer at once, so
/// unlike IP peers (one registry entry per TCP connection) the BLE plane is
/// registered as one outbound sink that fans out over the radio.
const BLE_REGISTRY_KEY: &str = "ble";

/// How often the BLE plane refreshes its own registry entry's `last_seen`.
/// Without this, `PeerRegistry::prune_older_than` (run by the IP transport's
/// cleanup loop) would eventually evict the BLE entry during a quiet period
/// with no inbound traffic, silently cutting off forward_to_peers's flood to
/// BLE for the rest of the node's lifetime.
const BLE_REGISTRY_KEEPALIVE: Duration = Duration::from_secs(60);

/// What a platform's BLE stack can actually do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleCapability {
    /// No BLE radio, or the host chose not to wire one up.
    Unavailable,
    /// Can scan and connect to peripherals, but cannot advertise a GATT
    /// service of its own.
    CentralOnly,
    /// Full peripheral + central support.
    Full,
}

/// A discovered BLE peer, as reported by the scanning half of a
/// [`BleRadio`].
#[derive(Debug, Clone, PartialEq)]
pub struct BlePeerInfo {
    pub address: String,
    pub name: Option<String>,
    pub node_id: Option<String>,
    pub rssi: i32,
    pub last_seen: DateTime<Utc>,
    pub is_connected: bool,
}

impl BlePeerInfo {
    /// Whether this peer's advertised name suggests it's a mesh node worth
    /// attempting a GATT connect to, before spending a radio connection
    /// slot on it.
    pub fn looks_like_mesh_peer(&self) -> bool {
        self.name
            .as_deref()
            .map(|n| n.contains("Disaster"))
            .unwrap_or(false)
    }
}

/// Narrow seam to a platform BLE stack. Implementations own the actual
/// GATT peripheral/central machinery; this crate only exchanges
/// already-framed bytes through it.
#[async_trait]
pub trait BleRadio: Send + Sync {
    fn capability(&self) -> BleCapability;

    /// Begin scanning for, and (capability permitting) advertising, the
    /// mesh's GATT service. Returns a channel of inbound writes
    /// `(peer_address, frame_bytes)`.
    async fn start(&self) -> Result<mpsc::UnboundedReceiver<(String, Vec<u8>)>, NodeError>;

    async fn stop(&self);

    /// Write `bytes` to every connected peer (peripheral write-back) and
    /// notify every subscribed central.
    async fn broadcast_bytes(&self, bytes: &[u8]);
}

/// A [`BleRadio`] that reports itself unavailable — the default when no
/// platform radio is wired up, or the platform has none.
#[derive(Default)]
pub struct NullBleRadio;

#[async_trait]
impl BleRadio for NullBleRadio {
    fn capability(&self) -> BleCapability {
        BleCapability::Unavailable
    }

    async fn start(&self) -> Result<mpsc::UnboundedReceiver<(String, Vec<u8>)>, NodeError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(rx)
    }

    async fn stop(&self) {}

    async fn broadcast_bytes(&self, _bytes: &[u8]) {}
}

const BLE_SEEN_SET_CAPACITY: usize = 5000;

struct SeenSet {
    order: Mutex<VecDeque<String>>,
}

impl SeenSet {
    fn new() -> Self {
        Self {
            order: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns `true` if `id` was already present.
    fn check_and_insert(&self, id: &str) -> bool {
        let mut order = self.order.lock().unwrap();
        if order.iter().any(|x| x == id) {
            return true;
        }
        if order.len() >= BLE_SEEN_SET_CAPACITY {
            order.pop_front();
        }
        order.push_back(id.to_string());
        false
    }
}

struct Inner {
    radio: Arc<dyn BleRadio>,
    router: Arc<PubSubRouter>,
    registry: Arc<PeerRegistry>,
    seen: SeenSet,
    shutdown: Notify,
    stopped: AtomicBool,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Encode and hand `envelope` to the radio, marking it seen first so a
    /// peripheral echoing our own write back to us is dropped rather than
    /// re-broadcast.
    async fn send_over_radio(&self, envelope: &GossipEnvelope) {
        if self.radio.capability() == BleCapability::Unavailable {
            return;
        }
        let frame = BleFrame::from(envelope);
        self.seen.check_and_insert(&frame.message_id);
        match frame.encode() {
            Some(bytes) => self.radio.broadcast_bytes(&bytes).await,
            None => warn!(
                message_id = %envelope.message_id,
                "envelope too large for BLE, IP-only delivery"
            ),
        }
    }
}

/// BLE plane: identical contract to [`super::ip::IpTransport`] from the
/// router's point of view. Maintains its own `SeenSet` so an envelope
/// re-emitted on BLE after arriving via IP doesn't loop back onto IP.
///
/// Registers a single [`BLE_REGISTRY_KEY`] entry in the shared
/// [`PeerRegistry`] while started, so `PubSubRouter::forward_to_peers`'s
/// flood reaches BLE subscribers the same way it reaches TCP peers.
#[derive(Clone)]
pub struct BleTransport(Arc<Inner>);

impl BleTransport {
    pub fn new(radio: Arc<dyn BleRadio>, router: Arc<PubSubRouter>, registry: Arc<PeerRegistry>) -> Self {
        Self(Arc::new(Inner {
            radio,
            router,
            registry,
            seen: SeenSet::new(),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
            reader_task: Mutex::new(None),
        }))
    }

    pub fn capability(&self) -> BleCapability {
        self.0.radio.capability()
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn name(&self) -> &'static str {
        "ble"
    }

    async fn start(&self) -> Result<(), NodeError> {
        if self.0.radio.capability() == BleCapability::Unavailable {
            debug!("BLE radio unavailable, transport stays idle");
            return Ok(());
        }

        self.0.stopped.store(false, Ordering::SeqCst);
        let mut inbound = self.0.radio.start().await?;

        // Register the BLE plane so forward_to_peers's flood reaches it.
        // The writer task drains forwarded envelopes and relays them over
        // the radio; it exits on its own once `stop` drops the registry
        // entry and closes the channel.
        let (tx, mut rx) = mpsc::unbounded_channel::<GossipEnvelope>();
        self.0.registry.add(
            BLE_REGISTRY_KEY,
            PeerInfo::new(BLE_REGISTRY_KEY, "ble:broadcast"),
            tx,
        );
        let writer_inner = Arc::clone(&self.0);
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                writer_inner.send_over_radio(&envelope).await;
            }
        });

        let keepalive_inner = Arc::clone(&self.0);
        tokio::spawn(async move {
            let mut ticker = interval(BLE_REGISTRY_KEEPALIVE);
            loop {
                if keepalive_inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = keepalive_inner.shutdown.notified() => break,
                    _ = ticker.tick() => keepalive_inner.registry.touch(BLE_REGISTRY_KEY),
                }
            }
        });

        let inner = Arc::clone(&self.0);
        let handle = tokio::spawn(async move {
            loop {
                if inner.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = inner.shutdown.notified() => break,
                    received = inbound.recv() => {
                        let Some((peer, bytes)) = received else { break };
                        let Some(frame) = BleFrame::decode(&bytes) else {
                            debug!(%peer, "dropped malformed BLE frame");
                            continue;
                        };
                        if inner.seen.check_and_insert(&frame.message_id) {
                            continue;
                        }
                        let envelope: GossipEnvelope = frame.into();
                        inner.router.ingest(envelope, Some(BLE_REGISTRY_KEY)).await;
                    }
                }
            }
        });
        *self.0.reader_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        self.0.shutdown.notify_waiters();
        self.0.radio.stop().await;
        self.0.registry.remove(BLE_REGISTRY_KEY);
        if let Some(handle) = self.0.reader_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn broadcast(&self, envelope: GossipEnvelope) {
        self.0.send_over_radio(&envelope).await;
    }

    async fn on_inbound(&self, envelope: GossipEnvelope, _source_peer_id: Option<String>) {
        if self.0.seen.check_and_insert(&envelope.message_id) {
            return;
        }
        self.0.router.ingest(envelope, Some(BLE_REGISTRY_KEY)).await;
    }
}
