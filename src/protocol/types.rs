//! Wire-protocol types for the gossip mesh.
//!
//! Envelopes are JSON on the wire (§4.2), not CBOR — the format needs to be
//! byte-readable by the out-of-scope BLE peripheral firmware and by anyone
//! sniffing UDP discovery beacons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of topics produced/consumed by the core (§6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `disaster/help-requests` — carries `HelpRequest` payloads.
    HelpRequests,
    /// `disaster/peer-discovery` — reserved; the core never publishes here.
    PeerDiscovery,
    /// `disaster/heartbeat` — produced every heartbeat interval.
    Heartbeat,
    /// Any other string, carried through unchanged. A closed set at the
    /// protocol level doesn't mean callers can't define their own topics.
    Other(String),
}

impl Topic {
    pub fn as_str(&self) -> &str {
        match self {
            Topic::HelpRequests => "disaster/help-requests",
            Topic::PeerDiscovery => "disaster/peer-discovery",
            Topic::Heartbeat => "disaster/heartbeat",
            Topic::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "disaster/help-requests" => Topic::HelpRequests,
            "disaster/peer-discovery" => Topic::PeerDiscovery,
            "disaster/heartbeat" => Topic::Heartbeat,
            other => Topic::Other(other.to_string()),
        }
    }
}

/// Wire-level wrapper around a topic payload.
///
/// `message_id` is the only identity the router uses for dedup and
/// forwarding — it MUST equal `payload.id` when `payload` is a
/// `HelpRequest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GossipEnvelope {
    pub topic: String,
    pub payload: Value,
    /// Last hop, NOT necessarily the originator.
    pub sender_id: String,
    pub message_id: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl GossipEnvelope {
    pub fn new(topic: impl Into<String>, payload: Value, sender_id: String, message_id: String) -> Self {
        Self {
            topic: topic.into(),
            payload,
            sender_id,
            message_id,
            timestamp: Utc::now().timestamp() as f64,
        }
    }
}

/// A known peer, keyed by `node_id` once learned (or by `multiaddr` as a
/// placeholder key before the first frame arrives).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerInfo {
    pub node_id: String,
    /// `host:port`, or `bluetooth:<MAC>` for BLE peers.
    pub multiaddr: String,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub latency_ms: Option<u64>,
}

/// Heartbeat payload published on [`Topic::Heartbeat`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatPayload {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub peers_count: usize,
    pub messages_count: usize,
}

/// A captured `tracing` event, for host-embeddable log capture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub level: String,
    pub target: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trips_through_str() {
        for t in [
            Topic::HelpRequests,
            Topic::PeerDiscovery,
            Topic::Heartbeat,
            Topic::Other("custom/topic".to_string()),
        ] {
            assert_eq!(Topic::parse(t.as_str()).as_str(), t.as_str());
        }
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let env = GossipEnvelope::new(
            "disaster/help-requests",
            serde_json::json!({"id": "abc"}),
            "node-a".to_string(),
            "abc".to_string(),
        );
        let encoded = serde_json::to_string(&env).unwrap();
        let decoded: GossipEnvelope = serde_json::from_str(&encoded).unwrap();
        assert_eq!(env, decoded);
    }
}
