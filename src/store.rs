//! Bounded in-memory store for gossiped help requests.
//!
//! Ported from `storage.py::MessageStorage`. Two independent bounded
//! structures live here: the retained-message map (capacity-evicted,
//! TTL-expired) and the `SeenSet` dedup cache (capacity-evicted only,
//! never expired — a message can be "seen" long after it has been
//! evicted from retention).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::geo::GeoLocation;
use crate::model::{HelpRequest, RequestType};

/// A stored [`HelpRequest`] plus store-local bookkeeping.
#[derive(Debug, Clone)]
pub struct RetainedRecord {
    pub request: HelpRequest,
    pub received_at: DateTime<Utc>,
}

/// Aggregate counters mirroring `storage.py::get_stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total_stored: usize,
    pub active_messages: usize,
    pub expired_messages: usize,
    pub total_received: u64,
    pub duplicates_rejected: u64,
    pub seen_ids_count: usize,
}

/// Outcome of a [`MessageStore::store`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Newly retained.
    Stored,
    /// Already seen; not retained again.
    Duplicate,
    /// Structurally valid but already past its TTL on arrival.
    Expired,
}

struct Inner {
    records: HashMap<String, RetainedRecord>,
    /// Insertion order, oldest first, used for the eviction scan.
    order: Vec<String>,
    seen: Vec<String>,
    seen_index: HashMap<String, ()>,
    total_received: u64,
    duplicates_rejected: u64,
}

/// Capacity-bounded, TTL-aware store of in-flight [`HelpRequest`]s.
///
/// All methods take `&self`; interior mutability is a single [`Mutex`],
/// matching the teacher's single-lock-per-component convention.
pub struct MessageStore {
    max_records: usize,
    max_seen: usize,
    inner: Mutex<Inner>,
}

impl MessageStore {
    pub fn new(max_records: usize, max_seen: usize) -> Self {
        Self {
            max_records: max_records.max(1),
            max_seen: max_seen.max(1),
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: Vec::new(),
                seen: Vec::new(),
                seen_index: HashMap::new(),
                total_received: 0,
                duplicates_rejected: 0,
            }),
        }
    }

    /// Whether `id` has already been observed by this store, regardless of
    /// whether the corresponding record is still retained.
    pub fn has_seen(&self, id: &str) -> bool {
        self.inner.lock().unwrap().seen_index.contains_key(id)
    }

    /// Insert `id` into the `SeenSet` without retaining any message —
    /// used by the router to suppress self-echo on publish and to record
    /// an inbound envelope's dedup key ahead of local delivery.
    pub fn mark_seen(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        mark_seen(&mut inner, id, self.max_seen);
    }

    /// Record `request`. Rejects (without error) a message already in the
    /// `SeenSet` or already expired on arrival, touching neither the
    /// `SeenSet` nor `total_received` on either rejection path; otherwise
    /// inserts into the retained map and the `SeenSet`, evicting first if
    /// at capacity.
    pub fn store(&self, request: HelpRequest) -> StoreOutcome {
        let mut inner = self.inner.lock().unwrap();

        if inner.seen_index.contains_key(&request.id) {
            inner.duplicates_rejected += 1;
            return StoreOutcome::Duplicate;
        }

        if request.is_expired() {
            return StoreOutcome::Expired;
        }

        if inner.records.len() >= self.max_records {
            evict_oldest(&mut inner);
        }

        mark_seen(&mut inner, &request.id, self.max_seen);
        inner.total_received += 1;
        inner.order.push(request.id.clone());
        inner.records.insert(
            request.id.clone(),
            RetainedRecord {
                request,
                received_at: Utc::now(),
            },
        );
        StoreOutcome::Stored
    }

    pub fn get(&self, id: &str) -> Option<HelpRequest> {
        self.inner
            .lock()
            .unwrap()
            .records
            .get(id)
            .map(|r| r.request.clone())
    }

    /// Snapshot of retained requests, newest first. Expired entries are
    /// included only if `include_expired` is set.
    pub fn get_all(&self, include_expired: bool) -> Vec<HelpRequest> {
        let inner = self.inner.lock().unwrap();
        let mut requests: Vec<HelpRequest> = inner
            .records
            .values()
            .filter(|r| include_expired || !r.request.is_expired())
            .map(|r| r.request.clone())
            .collect();
        requests.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        requests
    }

    pub fn get_by_type(&self, request_type: RequestType) -> Vec<HelpRequest> {
        self.inner
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|r| !r.request.is_expired() && r.request.request_type == request_type)
            .map(|r| r.request.clone())
            .collect()
    }

    /// Non-expired requests whose location is within `radius_km` of
    /// `center`, nearest first.
    pub fn get_nearby(&self, center: &GeoLocation, radius_km: f64) -> Vec<HelpRequest> {
        let inner = self.inner.lock().unwrap();
        let mut matches: Vec<(f64, HelpRequest)> = inner
            .records
            .values()
            .filter(|r| !r.request.is_expired())
            .filter_map(|r| {
                let d = center.distance_km(&r.request.location);
                (d <= radius_km).then(|| (d, r.request.clone()))
            })
            .collect();
        matches.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        matches.into_iter().map(|(_, req)| req).collect()
    }

    /// Remove all retained records whose TTL has elapsed; returns the count
    /// removed. `SeenSet` entries are untouched.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .records
            .iter()
            .filter(|(_, r)| r.request.is_expired())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            inner.records.remove(id);
            inner.order.retain(|x| x != id);
        }
        expired.len()
    }

    pub fn get_stats(&self) -> StoreStats {
        let inner = self.inner.lock().unwrap();
        let expired_messages = inner
            .records
            .values()
            .filter(|r| r.request.is_expired())
            .count();
        StoreStats {
            total_stored: inner.records.len(),
            active_messages: inner.records.len() - expired_messages,
            expired_messages,
            total_received: inner.total_received,
            duplicates_rejected: inner.duplicates_rejected,
            seen_ids_count: inner.seen_index.len(),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.records.clear();
        inner.order.clear();
        inner.seen.clear();
        inner.seen_index.clear();
        inner.total_received = 0;
        inner.duplicates_rejected = 0;
    }
}

/// Insert `id` into the `SeenSet`. On overflow, retains the newest half
/// (§4.1) rather than evicting one oldest entry per insert.
fn mark_seen(inner: &mut Inner, id: &str, max_seen: usize) {
    if inner.seen_index.contains_key(id) {
        return;
    }
    if inner.seen.len() >= max_seen {
        let keep_from = inner.seen.len() / 2;
        for dropped in inner.seen.drain(0..keep_from) {
            inner.seen_index.remove(&dropped);
        }
    }
    inner.seen.push(id.to_string());
    inner.seen_index.insert(id.to_string(), ());
}

/// Evict the oldest `max(1, n/10)` retained records by insertion order.
fn evict_oldest(inner: &mut Inner) {
    let n = inner.order.len();
    let evict_count = (n / 10).max(1).min(n);
    let to_evict: Vec<String> = inner.order.drain(0..evict_count).collect();
    for id in to_evict {
        inner.records.remove(&id);
    }
}
