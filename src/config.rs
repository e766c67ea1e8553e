//! Node configuration: all tunables, with the defaults from §6, loadable
//! from a TOML file and overridable by CLI flags.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listen_port: u16,
    pub udp_discovery_port: u16,
    pub discovery_interval_s: u64,
    pub heartbeat_interval_s: u64,
    pub cleanup_interval_s: u64,
    pub peer_stale_s: u64,
    pub dial_timeout_s: u64,
    pub max_frame_bytes: usize,
    pub ble_max_frame_bytes: usize,
    pub store_capacity: usize,
    pub seen_set_capacity: usize,
    pub enable_ble: bool,
    pub bootstrap_peers: Vec<String>,
    pub display_name: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: 4001,
            udp_discovery_port: 5000,
            discovery_interval_s: 10,
            heartbeat_interval_s: 60,
            cleanup_interval_s: 300,
            peer_stale_s: 300,
            dial_timeout_s: 5,
            max_frame_bytes: 65_535,
            ble_max_frame_bytes: 512,
            store_capacity: 10_000,
            seen_set_capacity: 10_000,
            enable_ble: false,
            bootstrap_peers: Vec::new(),
            display_name: None,
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_tunables_table() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.listen_port, 4001);
        assert_eq!(cfg.udp_discovery_port, 5000);
        assert_eq!(cfg.discovery_interval_s, 10);
        assert_eq!(cfg.heartbeat_interval_s, 60);
        assert_eq!(cfg.cleanup_interval_s, 300);
        assert_eq!(cfg.peer_stale_s, 300);
        assert_eq!(cfg.dial_timeout_s, 5);
        assert_eq!(cfg.max_frame_bytes, 65_535);
        assert_eq!(cfg.ble_max_frame_bytes, 512);
        assert_eq!(cfg.store_capacity, 10_000);
        assert_eq!(cfg.seen_set_capacity, 10_000);
        assert!(!cfg.enable_ble);
        assert!(cfg.bootstrap_peers.is_empty());
    }

    #[test]
    fn partial_toml_overlays_onto_defaults() {
        let cfg = NodeConfig::from_toml_str("listen_port = 5001\nenable_ble = true\n").unwrap();
        assert_eq!(cfg.listen_port, 5001);
        assert!(cfg.enable_ble);
        assert_eq!(cfg.udp_discovery_port, 5000);
    }
}
