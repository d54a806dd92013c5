//! Kademlia neighbour table: K-buckets over XOR distance, the closeness
//! oracle, and peer connection lifecycle (spec §4.D).
//!
//! Grounded on `lib-storage::dht::peer_registry::DhtPeerRegistry` — a
//! single `HashMap<NodeId, Entry>` plus a bucket-index secondary map,
//! replacing the historical `Vec<KBucket>` array-of-160-buckets design the
//! teacher crate's own doc comment describes migrating away from — and on
//! `lib-storage::dht::replication::DhtReplication`'s `find_closest`
//! (distance-sort-then-take) for `closest_peers`. Hold-counts generalize
//! `DhtPeerEntry::failed_attempts` bookkeeping to the spec's multi-table
//! `hold`/`drop` interest-counting (§4.D "Peer hold counts").

use crate::bloom::PeerBloom;
use crate::transport::PeerMessageQueue;
use chrono::{DateTime, Utc};
use lib_overlay_crypto::{hash, xor, HashKey, PublicKey};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default per-bucket capacity (spec §4.D: "typically 8").
pub const DEFAULT_BUCKET_SIZE: usize = 8;

/// Runtime-tunable neighbour table parameters.
#[derive(Debug, Clone, Copy)]
pub struct NeighbourTableConfig {
    /// Maximum live entries per bucket (`B` in the spec).
    pub bucket_size: usize,
}

impl Default for NeighbourTableConfig {
    fn default() -> Self {
        NeighbourTableConfig {
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

/// A connected neighbour: its identity, live send queue, liveness state,
/// and the count of DHT tables asking the underlay to keep it connected.
pub struct NeighbourEntry {
    pub pid: PublicKey,
    pub queue: Arc<dyn PeerMessageQueue>,
    pub last_active: DateTime<Utc>,
    pub liveness_failures: u32,
    pub hold_count: u32,
}

impl NeighbourEntry {
    fn id_hash(&self) -> HashKey {
        hash(self.pid.as_bytes())
    }
}

/// Binary Kademlia table over the 512-bit identity-hash space.
pub struct NeighbourTable {
    local_id_hash: HashKey,
    config: NeighbourTableConfig,
    /// Bucket index (`leading_zero_bits(H(pid) XOR local_id_hash)`) to the
    /// peers sharing that many leading bits with us.
    buckets: HashMap<u32, Vec<NeighbourEntry>>,
}

impl NeighbourTable {
    pub fn new(local_pid: &PublicKey, config: NeighbourTableConfig) -> Self {
        NeighbourTable {
            local_id_hash: hash(local_pid.as_bytes()),
            config,
            buckets: HashMap::new(),
        }
    }

    pub fn local_id_hash(&self) -> HashKey {
        self.local_id_hash
    }

    fn bucket_of(&self, pid: &PublicKey) -> u32 {
        xor(&hash(pid.as_bytes()), &self.local_id_hash).leading_zero_bits()
    }

    /// Number of currently connected peers, across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pid: &PublicKey) -> bool {
        let k = self.bucket_of(pid);
        self.buckets
            .get(&k)
            .is_some_and(|b| b.iter().any(|e| e.pid == *pid))
    }

    /// Register a freshly connected peer. Inserts into its bucket if there
    /// is room; otherwise replaces the least-recently-active entry, but
    /// only if that entry has already failed a liveness check (spec §4.D:
    /// "replace the least-recently-active entry only if it has failed
    /// liveness checks"). Returns `true` if the peer was admitted.
    pub fn peer_connected(&mut self, pid: PublicKey, queue: Arc<dyn PeerMessageQueue>) -> bool {
        let k = self.bucket_of(&pid);
        let bucket = self.buckets.entry(k).or_default();
        if let Some(existing) = bucket.iter_mut().find(|e| e.pid == pid) {
            existing.queue = queue;
            existing.last_active = Utc::now();
            existing.liveness_failures = 0;
            trace!(?pid, bucket = k, "peer re-announced, refreshed entry");
            return true;
        }
        if bucket.len() < self.config.bucket_size {
            bucket.push(NeighbourEntry {
                pid,
                queue,
                last_active: Utc::now(),
                liveness_failures: 0,
                hold_count: 0,
            });
            debug!(?pid, bucket = k, "peer connected");
            return true;
        }
        let lru_idx = bucket
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_active)
            .map(|(i, _)| i);
        match lru_idx {
            Some(i) if bucket[i].liveness_failures > 0 => {
                debug!(?pid, bucket = k, replaced = ?bucket[i].pid, "bucket full, replaced failed LRU entry");
                bucket[i] = NeighbourEntry {
                    pid,
                    queue,
                    last_active: Utc::now(),
                    liveness_failures: 0,
                    hold_count: 0,
                };
                true
            }
            _ => {
                trace!(?pid, bucket = k, "bucket full and LRU entry still live, rejecting");
                false
            }
        }
    }

    /// Remove a peer on disconnect. Returns the entries of other buckets
    /// that have room and should pull a replacement from their overflow
    /// list (spec §4.D: "trigger rebind from bucket overflow list") — here
    /// simply the set of non-full bucket indices, since this crate has no
    /// overflow list of its own to pull from (the underlay reconnects).
    pub fn peer_disconnected(&mut self, pid: &PublicKey) -> bool {
        let k = self.bucket_of(pid);
        if let Some(bucket) = self.buckets.get_mut(&k) {
            let before = bucket.len();
            bucket.retain(|e| e.pid != *pid);
            let removed = bucket.len() != before;
            if bucket.is_empty() {
                self.buckets.remove(&k);
            }
            if removed {
                debug!(?pid, bucket = k, "peer disconnected");
            }
            removed
        } else {
            false
        }
    }

    pub fn mark_failed(&mut self, pid: &PublicKey) {
        let k = self.bucket_of(pid);
        if let Some(bucket) = self.buckets.get_mut(&k) {
            if let Some(entry) = bucket.iter_mut().find(|e| e.pid == *pid) {
                entry.liveness_failures += 1;
            }
        }
    }

    pub fn mark_responsive(&mut self, pid: &PublicKey) {
        let k = self.bucket_of(pid);
        if let Some(bucket) = self.buckets.get_mut(&k) {
            if let Some(entry) = bucket.iter_mut().find(|e| e.pid == *pid) {
                entry.liveness_failures = 0;
                entry.last_active = Utc::now();
            }
        }
    }

    /// Express interest in keeping `pid` connected; the underlay is asked
    /// to preserve connectivity while the resulting hold count is nonzero
    /// (spec §4.D "Peer hold counts").
    pub fn hold(&mut self, pid: &PublicKey) {
        let k = self.bucket_of(pid);
        if let Some(entry) = self
            .buckets
            .get_mut(&k)
            .and_then(|b| b.iter_mut().find(|e| e.pid == *pid))
        {
            entry.hold_count += 1;
        }
    }

    /// Release a prior [`NeighbourTable::hold`]. Returns the resulting
    /// hold count, or `None` if the peer is not connected.
    pub fn drop_hold(&mut self, pid: &PublicKey) -> Option<u32> {
        let k = self.bucket_of(pid);
        let entry = self
            .buckets
            .get_mut(&k)
            .and_then(|b| b.iter_mut().find(|e| e.pid == *pid))?;
        entry.hold_count = entry.hold_count.saturating_sub(1);
        Some(entry.hold_count)
    }

    /// Up to `count` connected peers ordered by ascending XOR distance to
    /// `target`, skipping any testing positive in `excluded`. Distance is
    /// the full 512-bit XOR value compared as an unsigned integer (spec
    /// Glossary "XOR distance"), not merely its leading-zero-bit count —
    /// two peers sharing a bucket can still differ in true distance. Ties
    /// are broken by lexicographically smaller peer hash (spec §4.E
    /// "Tie-break rule"); under the full-precision metric this can only
    /// occur between identical peer hashes, so the tie-break is a no-op in
    /// practice but kept for determinism.
    pub fn closest_peers(&self, target: &HashKey, count: usize, excluded: &PeerBloom) -> Vec<&NeighbourEntry> {
        let mut candidates: Vec<(HashKey, HashKey, &NeighbourEntry)> = self
            .buckets
            .values()
            .flatten()
            .filter(|e| !excluded.contains(&e.id_hash()))
            .map(|e| (xor(&e.id_hash(), target), e.id_hash(), e))
            .collect();
        // Smaller XOR distance == closer; sort ascending by distance bytes,
        // then ascending by peer hash for the tie-break rule.
        candidates.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()).then_with(|| a.1.as_bytes().cmp(b.1.as_bytes())));
        candidates.into_iter().take(count).map(|(_, _, e)| e).collect()
    }

    /// `true` iff no connected peer outside `excluded` is closer to
    /// `target` than the local identity (spec testable property 5: `∄ p ∉
    /// bloom` with `xor(H(p), local) < xor(k, local)`, compared as the
    /// full 512-bit unsigned XOR value, not the leading-zero-bit count).
    pub fn am_closest(&self, target: &HashKey, excluded: &PeerBloom) -> bool {
        let local_distance = xor(&self.local_id_hash, target);
        !self
            .buckets
            .values()
            .flatten()
            .filter(|e| !excluded.contains(&e.id_hash()))
            .any(|e| xor(&e.id_hash(), target).as_bytes() < local_distance.as_bytes())
    }

    pub fn queue_for(&self, pid: &PublicKey) -> Option<Arc<dyn PeerMessageQueue>> {
        let k = self.bucket_of(pid);
        self.buckets
            .get(&k)
            .and_then(|b| b.iter().find(|e| e.pid == *pid))
            .map(|e| e.queue.clone())
    }
}
