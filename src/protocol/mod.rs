//! Wire protocol: envelope types, IP framing, and the BLE-specific compact
//! frame.

pub mod ble_frame;
pub mod codec;
pub mod types;

pub use ble_frame::BleFrame;
pub use codec::{decode, encode, read_frame, write_frame, FrameError, MAX_FRAME_BYTES};
pub use types::{GossipEnvelope, HeartbeatPayload, LogEntry, PeerInfo, Topic};
