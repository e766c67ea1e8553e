//! Compact short-key JSON frame for BLE transmission (§11).
//!
//! BLE's 512-byte write-characteristic ceiling makes every byte count, so
//! the BLE plane encodes a [`GossipEnvelope`] with single-letter keys
//! instead of the IP transport's full-key JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::GossipEnvelope;

/// BLE's per-write size ceiling (§4.6). Envelopes that don't fit are simply
/// not sent over BLE — they still travel over IP.
pub const MAX_BLE_FRAME_BYTES: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BleFrame {
    #[serde(rename = "t")]
    pub topic: String,
    #[serde(rename = "p")]
    pub payload: Value,
    #[serde(rename = "s")]
    pub sender_id: String,
    #[serde(rename = "m")]
    pub message_id: String,
    #[serde(rename = "ts")]
    pub timestamp: f64,
}

impl From<&GossipEnvelope> for BleFrame {
    fn from(env: &GossipEnvelope) -> Self {
        Self {
            topic: env.topic.clone(),
            payload: env.payload.clone(),
            sender_id: env.sender_id.clone(),
            message_id: env.message_id.clone(),
            timestamp: env.timestamp,
        }
    }
}

impl From<BleFrame> for GossipEnvelope {
    fn from(frame: BleFrame) -> Self {
        GossipEnvelope {
            topic: frame.topic,
            payload: frame.payload,
            sender_id: frame.sender_id,
            message_id: frame.message_id,
            timestamp: frame.timestamp,
        }
    }
}

impl BleFrame {
    /// Encode to compact JSON bytes, or `None` if the result would exceed
    /// [`MAX_BLE_FRAME_BYTES`].
    pub fn encode(&self) -> Option<Vec<u8>> {
        let bytes = serde_json::to_vec(self).ok()?;
        (bytes.len() <= MAX_BLE_FRAME_BYTES).then_some(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> GossipEnvelope {
        GossipEnvelope::new(
            "disaster/help-requests",
            json!({"id": "abc"}),
            "node-a".to_string(),
            "abc".to_string(),
        )
    }

    #[test]
    fn uses_short_keys_on_the_wire() {
        let frame = BleFrame::from(&envelope());
        let encoded = String::from_utf8(frame.encode().unwrap()).unwrap();
        assert!(encoded.contains("\"t\":"));
        assert!(encoded.contains("\"s\":"));
        assert!(!encoded.contains("\"topic\":"));
    }

    #[test]
    fn round_trips_through_gossip_envelope() {
        let env = envelope();
        let frame = BleFrame::from(&env);
        let back: GossipEnvelope = frame.into();
        assert_eq!(env, back);
    }

    #[test]
    fn oversize_frame_is_not_encoded() {
        let mut env = envelope();
        env.payload = json!({"blob": "x".repeat(600)});
        let frame = BleFrame::from(&env);
        assert_eq!(frame.encode(), None);
    }
}
