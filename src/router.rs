//! Sole entry point for gossip traffic in both directions.
//!
//! Owns the dedup decision, local subscriber fan-out, and forward-flood to
//! every peer except the one a message arrived from.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::identity::Identity;
use crate::protocol::GossipEnvelope;
use crate::registry::PeerRegistry;
use crate::store::MessageStore;

/// A pure sink invoked once per matching envelope. Handler panics are
/// caught by [`PubSubRouter::ingest`] and logged, never propagated.
pub type Handler = Box<dyn Fn(Value) + Send + Sync>;

/// Threshold past which a slow handler earns a warn-log (§5).
const SLOW_HANDLER_THRESHOLD: Duration = Duration::from_millis(100);

struct Inner {
    handlers: HashMap<String, Vec<Handler>>,
    messages_received: u64,
}

/// Topic-indexed subscription table, dedup authority, and flood router.
pub struct PubSubRouter {
    identity: Identity,
    store: std::sync::Arc<MessageStore>,
    registry: std::sync::Arc<PeerRegistry>,
    inner: Mutex<Inner>,
}

impl PubSubRouter {
    pub fn new(
        identity: Identity,
        store: std::sync::Arc<MessageStore>,
        registry: std::sync::Arc<PeerRegistry>,
    ) -> Self {
        Self {
            identity,
            store,
            registry,
            inner: Mutex::new(Inner {
                handlers: HashMap::new(),
                messages_received: 0,
            }),
        }
    }

    /// Register a handler for `topic`. Handlers are invoked synchronously
    /// from [`ingest`](Self::ingest) in registration order.
    pub fn subscribe(&self, topic: impl Into<String>, handler: Handler) {
        self.inner
            .lock()
            .unwrap()
            .handlers
            .entry(topic.into())
            .or_default()
            .push(handler);
    }

    /// Produce an envelope for `payload` on `topic`, mark it seen to
    /// suppress self-echo, and return it for the transport plane to
    /// broadcast.
    pub fn publish(&self, topic: impl Into<String>, payload: Value) -> GossipEnvelope {
        let topic = topic.into();
        let message_id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", self.identity.node_id, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()));

        // Mark seen first so an echo of our own publish (looped back by a
        // peer) is dropped rather than re-delivered.
        self.store.mark_seen(&message_id);

        GossipEnvelope::new(topic, payload, self.identity.node_id.clone(), message_id)
    }

    /// Ingest an inbound (or locally-published) envelope. Deduplicates via
    /// the `SeenSet`, fans out to local handlers, then forwards verbatim to
    /// every peer except `source_peer_id`.
    pub async fn ingest(&self, envelope: GossipEnvelope, source_peer_id: Option<&str>) {
        if self.store.has_seen(&envelope.message_id) {
            return;
        }

        self.store.mark_seen(&envelope.message_id);

        {
            let mut inner = self.inner.lock().unwrap();
            inner.messages_received += 1;
        }

        if let Some(peer_id) = source_peer_id {
            self.registry.touch(peer_id);
        }

        self.fan_out_local(&envelope);
        self.forward_to_peers(&envelope, source_peer_id);
    }

    fn fan_out_local(&self, envelope: &GossipEnvelope) {
        let inner = self.inner.lock().unwrap();
        if let Some(handlers) = inner.handlers.get(&envelope.topic) {
            for handler in handlers {
                let start = std::time::Instant::now();
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    handler(envelope.payload.clone());
                }));
                if let Err(panic) = result {
                    warn!(topic = %envelope.topic, ?panic, "subscriber handler panicked");
                }
                if start.elapsed() > SLOW_HANDLER_THRESHOLD {
                    warn!(topic = %envelope.topic, elapsed_ms = start.elapsed().as_millis() as u64, "slow subscriber handler");
                }
            }
        }
    }

    fn forward_to_peers(&self, envelope: &GossipEnvelope, source_peer_id: Option<&str>) {
        for (peer_id, writer) in self.registry.snapshot() {
            if Some(peer_id.as_str()) == source_peer_id {
                continue;
            }
            if writer.send(envelope.clone()).is_err() {
                debug!(peer = %peer_id, "peer write failed, removing from registry");
                self.registry.remove(&peer_id);
            }
        }
    }

    pub fn messages_received(&self) -> u64 {
        self.inner.lock().unwrap().messages_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn router() -> PubSubRouter {
        let identity = Identity::new("self-node".to_string(), "pk".to_string(), None);
        PubSubRouter::new(
            identity,
            Arc::new(MessageStore::new(100, 1000)),
            Arc::new(PeerRegistry::new()),
        )
    }

    #[tokio::test]
    async fn publish_marks_seen_to_suppress_self_echo() {
        let r = router();
        let env = r.publish("disaster/help-requests", serde_json::json!({"id": "m1"}));
        assert!(r.store.has_seen("m1"));
        assert_eq!(env.sender_id, "self-node");
    }

    #[tokio::test]
    async fn ingest_delivers_to_subscribed_handler_once() {
        let r = router();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        r.subscribe(
            "disaster/help-requests",
            Box::new(move |_payload| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let env = GossipEnvelope::new(
            "disaster/help-requests",
            serde_json::json!({"id": "m1"}),
            "peer-1".to_string(),
            "m1".to_string(),
        );
        r.ingest(env.clone(), Some("peer-1")).await;
        r.ingest(env, Some("peer-1")).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(r.messages_received(), 1);
    }

    #[tokio::test]
    async fn ingest_forwards_to_peers_except_source() {
        let r = router();
        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        r.registry
            .add("peer-a", crate::registry::PeerInfo::new("peer-a", "a:1"), tx_a);
        r.registry
            .add("peer-b", crate::registry::PeerInfo::new("peer-b", "b:1"), tx_b);

        let env = GossipEnvelope::new(
            "disaster/help-requests",
            serde_json::json!({"id": "m1"}),
            "peer-a".to_string(),
            "m1".to_string(),
        );
        r.ingest(env, Some("peer-a")).await;

        assert!(rx_a.try_recv().is_err(), "source peer must not receive its own message back");
        assert!(rx_b.try_recv().is_ok(), "non-source peer must receive the forward");
    }

    #[tokio::test]
    async fn handler_panic_does_not_abort_other_handlers() {
        let r = router();
        let count = Arc::new(AtomicUsize::new(0));
        r.subscribe("t", Box::new(|_| panic!("boom")));
        let count_clone = count.clone();
        r.subscribe(
            "t",
            Box::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let env = GossipEnvelope::new("t", serde_json::json!({}), "peer-1".to_string(), "m1".to_string());
        r.ingest(env, None).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
