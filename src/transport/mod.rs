//! Transport plane: concrete IP and BLE transports sharing one contract.
//!
//! Collapses the two near-duplicate transport notions in the source into a
//! single trait so the node can hold a `Vec<Box<dyn Transport>>` without
//! caring which concrete kind each element is (§9).

pub mod ble;
pub mod ip;

use async_trait::async_trait;

use crate::error::NodeError;
use crate::protocol::GossipEnvelope;

/// Shared contract for every concrete transport.
///
/// `broadcast` sends `envelope` out over this transport to every peer it
/// currently knows about. Inbound envelopes are delivered by the transport
/// calling `PubSubRouter::ingest` directly — `on_inbound` exists on the
/// trait so a transport can also accept envelopes handed to it externally
/// (e.g. a test harness, or a future transport that receives frames
/// out-of-band).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name for logging (`"ip"`, `"ble"`).
    fn name(&self) -> &'static str;

    /// Start all background tasks. Must be idempotent against being called
    /// once; a second call is a logic error in the caller, not handled here.
    async fn start(&self) -> Result<(), NodeError>;

    /// Idempotent shutdown: cancel background tasks, close sockets, await
    /// completion.
    async fn stop(&self);

    /// Send `envelope` to every peer reachable over this transport.
    async fn broadcast(&self, envelope: GossipEnvelope);

    /// Hand an externally-obtained envelope to this transport's ingest path
    /// as though it had arrived on the wire.
    async fn on_inbound(&self, envelope: GossipEnvelope, source_peer_id: Option<String>);
}
