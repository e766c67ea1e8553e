//! LAN discovery and store-scenario tests drawn from the testable-property
//! scenarios: capacity eviction arithmetic, TTL expiry, geospatial query,
//! and two nodes finding each other purely via UDP broadcast beacons (no
//! `bootstrap_peers`).

use std::sync::Arc;
use std::time::Duration;

use meshrelief_core::{GeoLocation, HelpRequest, MessageStore, Node, NodeConfig, RequestPriority, RequestType};

fn request_at(lat: f64, lon: f64, sender: &str) -> HelpRequest {
    HelpRequest::new(
        RequestType::Shelter,
        RequestPriority::Medium,
        "Need shelter".to_string(),
        "Roof collapsed, family needs temporary shelter".to_string(),
        GeoLocation::new(lat, lon, None, None).unwrap(),
        None,
        3600,
        sender.to_string(),
    )
    .unwrap()
}

#[test]
fn capacity_eviction_retains_91_of_101_inserts_at_capacity_100() {
    let store = MessageStore::new(100, 1000);
    for i in 0..101 {
        store.store(request_at(41.0, 29.0, &format!("node-{i}")));
    }
    assert_eq!(store.get_stats().total_stored, 91);
}

#[test]
fn expired_requests_are_not_retained_and_do_not_count_toward_capacity() {
    let store = MessageStore::new(10, 100);
    let mut stale = request_at(41.0, 29.0, "node-a");
    stale.ttl_seconds = 60;
    stale.timestamp = chrono::Utc::now() - chrono::Duration::seconds(120);
    assert_eq!(store.store(stale), meshrelief_core::StoreOutcome::Expired);
    assert_eq!(store.get_stats().total_stored, 0);
}

#[test]
fn get_nearby_returns_only_requests_within_radius_nearest_first() {
    let store = MessageStore::new(100, 100);
    let istanbul = request_at(41.0082, 28.9784, "node-istanbul");
    let izmit = request_at(40.7654, 29.9408, "node-izmit"); // ~90km away
    let berlin = request_at(52.5200, 13.4050, "node-berlin"); // ~1700km away
    store.store(istanbul.clone());
    store.store(izmit.clone());
    store.store(berlin);

    let center = GeoLocation::new(41.0082, 28.9784, None, None).unwrap();
    let nearby = store.get_nearby(&center, 150.0);

    assert_eq!(nearby.len(), 2);
    assert_eq!(nearby[0].sender_id, istanbul.sender_id);
    assert_eq!(nearby[1].sender_id, izmit.sender_id);
}

#[test]
fn cleanup_expired_removes_decayed_records_only() {
    let store = MessageStore::new(10, 100);
    let mut fresh = request_at(41.0, 29.0, "node-fresh");
    fresh.ttl_seconds = 3600;
    store.store(fresh);

    assert_eq!(store.cleanup_expired(), 0);
    assert_eq!(store.get_stats().total_stored, 1);
}

fn discovery_config(listen_port: u16, udp_discovery_port: u16) -> NodeConfig {
    NodeConfig {
        listen_port,
        udp_discovery_port,
        discovery_interval_s: 3600,
        heartbeat_interval_s: 3600,
        cleanup_interval_s: 3600,
        ..NodeConfig::default()
    }
}

/// Two real nodes on distinct discovery ports (binding the same UDP port
/// twice from one test process isn't representative of separate hosts on a
/// LAN). Node B's broadcaster is inert here; instead the test hand-crafts
/// the beacon datagram node B would have sent, to exercise node A's
/// listener -> dial path in isolation.
#[tokio::test(flavor = "multi_thread")]
async fn discovery_listener_dials_a_peer_announced_by_beacon() {
    let node_a = Arc::new(Node::new(discovery_config(19501, 19551), None));
    node_a.start().await.unwrap();

    let node_b = Arc::new(Node::new(discovery_config(19502, 19552), None));
    node_b.start().await.unwrap();

    let beacon = serde_json::json!({
        "node_id": node_b.identity().node_id,
        "port": 19502,
        "name": node_b.identity().display_name,
    });
    let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender
        .send_to(
            serde_json::to_vec(&beacon).unwrap().as_slice(),
            "127.0.0.1:19551",
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(node_a.get_peers().len(), 1, "A should have dialed B after the beacon");

    node_a.stop().await;
    node_b.stop().await;
}
