//! Gossip messaging core for a decentralized disaster-response mesh node.
//!
//! A node exchanges [`model::HelpRequest`] broadcasts with its peers over a
//! local IP network and, optionally, a best-effort BLE mesh, using epidemic
//! (flood) gossip with hop-count-free duplicate suppression. See
//! [`node::Node`] for the façade most callers want.

pub mod config;
pub mod error;
pub mod geo;
pub mod identity;
pub mod log_layer;
pub mod model;
pub mod node;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod store;
pub mod transport;

pub use config::NodeConfig;
pub use error::{NodeError, ValidationError};
pub use geo::GeoLocation;
pub use identity::Identity;
pub use model::{HelpRequest, RequestPriority, RequestType};
pub use node::{get_node, init_node, shutdown_node, Node, NodeStats};
pub use protocol::{GossipEnvelope, Topic};
pub use registry::PeerInfo;
pub use router::Handler;
pub use store::{MessageStore, StoreOutcome, StoreStats};
