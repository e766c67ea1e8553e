//! TCP server + dialer + UDP discovery + heartbeat + cleanup, all bound to
//! one `start`/`stop` lifecycle (§4.5).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::identity::Identity;
use crate::protocol::{codec, GossipEnvelope, Topic};
use crate::registry::{PeerInfo, PeerRegistry};
use crate::router::PubSubRouter;
use crate::store::MessageStore;

use super::Transport;

/// UDP discovery beacon (§6): `{node_id, port, name}`, single datagram,
/// no framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscoveryBeacon {
    node_id: String,
    port: u16,
    name: Option<String>,
}

struct Inner {
    identity: Identity,
    config: NodeConfig,
    router: Arc<PubSubRouter>,
    registry: Arc<PeerRegistry>,
    store: Arc<MessageStore>,
    shutdown: Notify,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheap-to-clone handle around the shared transport state; lets background
/// tasks hold a `'static` reference without the trait needing `Arc<Self>`
/// receivers.
#[derive(Clone)]
pub struct IpTransport(Arc<Inner>);

impl IpTransport {
    pub fn new(
        identity: Identity,
        config: NodeConfig,
        router: Arc<PubSubRouter>,
        registry: Arc<PeerRegistry>,
        store: Arc<MessageStore>,
    ) -> Self {
        Self(Arc::new(Inner {
            identity,
            config,
            router,
            registry,
            store,
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Dial `endpoint` (`host[:port][/peer_id]`), register the connection,
    /// and start its reader. Dial failures are NOT retried by this
    /// component (§4.5) — that's the orchestrator's job.
    pub async fn connect(&self, endpoint: &str) -> Result<(), NodeError> {
        let (host, port, peer_id_hint) = parse_endpoint(endpoint);
        let addr = format!("{host}:{port}");
        let placeholder_key = peer_id_hint.unwrap_or_else(|| addr.clone());

        let stream = timeout(
            Duration::from_secs(self.0.config.dial_timeout_s),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| NodeError::Dial(format!("timed out dialing {addr}")))?
        .map_err(|e| NodeError::Dial(format!("{addr}: {e}")))?;

        info!(peer = %addr, "dialed peer");
        self.0.adopt_connection(stream, placeholder_key, addr).await;
        Ok(())
    }
}

/// Parse `host[:port][/peer_id]` (§6). Missing port defaults to 4001;
/// missing `peer_id` leaves the caller to key the peer by its endpoint
/// until a frame reveals the real id.
fn parse_endpoint(endpoint: &str) -> (String, u16, Option<String>) {
    let (addr_part, peer_id) = match endpoint.split_once('/') {
        Some((a, p)) => (a, Some(p.to_string())),
        None => (endpoint, None),
    };
    let (host, port) = match addr_part.rsplit_once(':') {
        Some((h, p)) => (h.to_string(), p.parse().unwrap_or(4001)),
        None => (addr_part.to_string(), 4001),
    };
    (host, port, peer_id)
}

impl Inner {
    async fn adopt_connection(self: &Arc<Self>, stream: TcpStream, placeholder_key: String, multiaddr: String) {
        let (mut read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<GossipEnvelope>();

        self.registry.add(
            placeholder_key.clone(),
            PeerInfo::new(placeholder_key.clone(), multiaddr),
            tx,
        );

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if codec::write_frame(&mut write_half, &envelope).await.is_err() {
                    break;
                }
            }
        });

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut current_key = placeholder_key;
            loop {
                if this.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = this.shutdown.notified() => break,
                    frame = codec::read_frame(&mut read_half) => {
                        match frame {
                            Ok(Some(bytes)) => match codec::decode(&bytes) {
                                Ok(envelope) => {
                                    if envelope.sender_id != this.identity.node_id
                                        && envelope.sender_id != current_key
                                    {
                                        this.registry.rekey(&current_key, &envelope.sender_id);
                                        current_key = envelope.sender_id.clone();
                                    }
                                    this.router.ingest(envelope, Some(current_key.as_str())).await;
                                }
                                Err(_) => debug!(peer = %current_key, "dropped malformed frame"),
                            },
                            Ok(None) => break,
                            Err(e) => {
                                warn!(peer = %current_key, error = %e, "read error, closing connection");
                                break;
                            }
                        }
                    }
                }
            }
            this.registry.remove(&current_key);
        });

        self.tasks.lock().await.push(handle);
    }

    async fn broadcast_envelope(&self, envelope: GossipEnvelope) {
        for (peer_id, writer) in self.registry.snapshot() {
            if writer.send(envelope.clone()).is_err() {
                debug!(peer = %peer_id, "peer write failed, removing from registry");
                self.registry.remove(&peer_id);
            }
        }
    }

    async fn run_tcp_server(self: &Arc<Self>) -> Result<(), NodeError> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.listen_port)
            .parse()
            .map_err(|e| NodeError::Bind(format!("{e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NodeError::Bind(e.to_string()))?;
        info!(%addr, "tcp listener bound");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if this.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = this.shutdown.notified() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer_addr)) => {
                                let key = peer_addr.to_string();
                                this.adopt_connection(stream, key.clone(), key).await;
                            }
                            Err(e) => warn!(error = %e, "tcp accept failed"),
                        }
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    async fn run_discovery_listener(self: &Arc<Self>) -> Result<(), NodeError> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.udp_discovery_port)
            .parse()
            .map_err(|e| NodeError::Bind(format!("{e}")))?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| NodeError::Bind(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| NodeError::Bind(e.to_string()))?;
        info!(%addr, "udp discovery listener bound");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                if this.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = this.shutdown.notified() => break,
                    recvd = socket.recv_from(&mut buf) => {
                        let Ok((len, from)) = recvd else { continue };
                        let Ok(beacon) = serde_json::from_slice::<DiscoveryBeacon>(&buf[..len]) else { continue };
                        if beacon.node_id == this.identity.node_id {
                            continue;
                        }
                        if this.registry.get(&beacon.node_id).is_some() {
                            continue;
                        }
                        let endpoint = format!("{}:{}", from.ip(), beacon.port);
                        let this2 = Arc::clone(&this);
                        tokio::spawn(async move {
                            let transport = IpTransport(this2);
                            if let Err(e) = transport.connect(&endpoint).await {
                                warn!(%endpoint, error = %e, "discovery dial failed");
                            }
                        });
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    async fn run_discovery_broadcaster(self: &Arc<Self>) -> Result<(), NodeError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| NodeError::Bind(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| NodeError::Bind(e.to_string()))?;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let dest: SocketAddr = format!("255.255.255.255:{}", this.config.udp_discovery_port)
                .parse()
                .expect("valid broadcast address");
            let mut ticker = interval(Duration::from_secs(this.config.discovery_interval_s));
            loop {
                if this.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = this.shutdown.notified() => break,
                    _ = ticker.tick() => {
                        let beacon = DiscoveryBeacon {
                            node_id: this.identity.node_id.clone(),
                            port: this.config.listen_port,
                            name: this.identity.display_name.clone(),
                        };
                        if let Ok(bytes) = serde_json::to_vec(&beacon) {
                            let _ = socket.send_to(&bytes, dest).await;
                        }
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    async fn run_heartbeat(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(this.config.heartbeat_interval_s));
            loop {
                if this.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = this.shutdown.notified() => break,
                    _ = ticker.tick() => {
                        if this.registry.is_empty() {
                            continue;
                        }
                        let payload = serde_json::json!({
                            "node_id": this.identity.node_id,
                            "timestamp": chrono::Utc::now(),
                            "peers_count": this.registry.len(),
                            "messages_count": this.store.get_stats().total_stored,
                        });
                        let envelope = this.router.publish(Topic::Heartbeat.as_str(), payload);
                        this.broadcast_envelope(envelope).await;
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }

    async fn run_cleanup(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(this.config.cleanup_interval_s));
            loop {
                if this.stopped.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = this.shutdown.notified() => break,
                    _ = ticker.tick() => {
                        let expired = this.store.cleanup_expired();
                        let cutoff = chrono::Utc::now()
                            - chrono::Duration::seconds(this.config.peer_stale_s as i64);
                        let pruned = this.registry.prune_older_than(cutoff);
                        if expired > 0 || !pruned.is_empty() {
                            debug!(expired, pruned = pruned.len(), "cleanup cycle");
                        }
                    }
                }
            }
        });
        self.tasks.lock().await.push(handle);
    }
}

#[async_trait]
impl Transport for IpTransport {
    fn name(&self) -> &'static str {
        "ip"
    }

    async fn start(&self) -> Result<(), NodeError> {
        self.0.stopped.store(false, Ordering::SeqCst);
        self.0.run_tcp_server().await?;
        self.0.run_discovery_listener().await?;
        self.0.run_discovery_broadcaster().await?;
        self.0.run_heartbeat().await;
        self.0.run_cleanup().await;

        for endpoint in self.0.config.bootstrap_peers.clone() {
            if let Err(e) = self.connect(&endpoint).await {
                warn!(%endpoint, error = %e, "bootstrap dial failed");
            }
        }
        Ok(())
    }

    async fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        self.0.shutdown.notify_waiters();
        let mut tasks = self.0.tasks.lock().await;
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }

    async fn broadcast(&self, envelope: GossipEnvelope) {
        self.0.broadcast_envelope(envelope).await;
    }

    async fn on_inbound(&self, envelope: GossipEnvelope, source_peer_id: Option<String>) {
        self.0
            .router
            .ingest(envelope, source_peer_id.as_deref())
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoint_with_port_and_peer_id() {
        assert_eq!(
            parse_endpoint("127.0.0.1:4002/node-b"),
            ("127.0.0.1".to_string(), 4002, Some("node-b".to_string()))
        );
    }

    #[test]
    fn parse_endpoint_defaults_port_4001() {
        assert_eq!(
            parse_endpoint("127.0.0.1"),
            ("127.0.0.1".to_string(), 4001, None)
        );
    }

    #[test]
    fn parse_endpoint_port_without_peer_id() {
        assert_eq!(
            parse_endpoint("example.local:9000"),
            ("example.local".to_string(), 9000, None)
        );
    }

    #[test]
    fn discovery_beacon_round_trips_through_json() {
        let beacon = DiscoveryBeacon {
            node_id: "abc123".to_string(),
            port: 4001,
            name: Some("Rescue-Van-3".to_string()),
        };
        let bytes = serde_json::to_vec(&beacon).unwrap();
        let decoded: DiscoveryBeacon = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.node_id, beacon.node_id);
        assert_eq!(decoded.port, beacon.port);
        assert_eq!(decoded.name, beacon.name);
    }
}
