//! Node identity.
//!
//! A stable pseudonymous identifier for the lifetime of the process. The
//! core carries `public_key` as an opaque hex string; signing and key
//! management live entirely outside this crate (spec §1).

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length, in hex characters, of a [`Identity::node_id`].
pub const NODE_ID_HEX_LEN: usize = 16;

/// Cryptographic identity for a node.
///
/// Created once at node start, immutable thereafter, dropped at shutdown.
/// `public_key` and any future `signature` bytes attached to messages are
/// opaque to this crate — wallet/keypair semantics are an external concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub node_id: String,
    pub public_key: String,
    pub display_name: Option<String>,
}

impl Identity {
    /// Construct an identity from caller-supplied material (e.g. the
    /// façade's wallet layer already derived a real keypair).
    pub fn new(node_id: String, public_key: String, display_name: Option<String>) -> Self {
        Self {
            node_id,
            public_key,
            display_name,
        }
    }

    /// Generate a conceptual identity: 32 random bytes stand in for a public
    /// key, and `node_id` is the first 16 hex chars of its SHA-256 digest.
    ///
    /// Mirrors `models.py::NodeIdentity.generate_conceptual` — a real
    /// deployment would derive `node_id` from an actual public key minted by
    /// the out-of-scope wallet layer.
    pub fn generate(display_name: Option<String>) -> Self {
        let mut key_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key_bytes);
        let public_key = hex::encode(key_bytes);

        let digest = Sha256::digest(public_key.as_bytes());
        let node_id = hex::encode(digest)[..NODE_ID_HEX_LEN].to_string();

        let display_name =
            display_name.or_else(|| Some(format!("Node-{}", &node_id[..6.min(node_id.len())])));

        Self {
            node_id,
            public_key,
            display_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_node_id_is_16_hex_chars() {
        let id = Identity::generate(None);
        assert_eq!(id.node_id.len(), NODE_ID_HEX_LEN);
        assert!(id.node_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_identities_are_distinct() {
        let a = Identity::generate(None);
        let b = Identity::generate(None);
        assert_ne!(a.node_id, b.node_id);
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn default_display_name_derived_from_node_id() {
        let id = Identity::generate(None);
        assert!(id.display_name.unwrap().starts_with("Node-"));
    }

    #[test]
    fn explicit_display_name_preserved() {
        let id = Identity::generate(Some("Rescue-Van-3".into()));
        assert_eq!(id.display_name.as_deref(), Some("Rescue-Van-3"));
    }
}
