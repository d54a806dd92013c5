//! Proximity-weighted, size-capped block store (spec §4.B).

use crate::block::{Block, BlockType};
use chrono::{DateTime, Utc};
use lib_overlay_crypto::{xor, HashKey};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store capacity must be greater than zero")]
    ZeroCapacity,
}

/// Runtime-tunable store parameters (ambient: avoids hard-coded literals,
/// matching `DhtRateLimiter::new(max_operations, window_secs)` in the
/// teacher crate).
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Maximum number of blocks retained across all keys.
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig { capacity: 4096 }
    }
}

/// A filter tested against a block's [`Block::content_hash`] before it is
/// returned from [`BlockStore::get`] — implemented by the reply-bloom in
/// `lib-overlay-dht` without this crate depending on it.
pub trait ReplyFilter {
    fn contains(&self, content_hash: &HashKey) -> bool;
}

/// A filter that never matches, for callers with no dedup context.
pub struct NoFilter;

impl ReplyFilter for NoFilter {
    fn contains(&self, _content_hash: &HashKey) -> bool {
        false
    }
}

struct Entry {
    block: Block,
    /// `leading_zero_bits(key XOR local_id)`, cached at insertion time.
    proximity: u32,
}

/// A size-capped map from `HashKey -> Vec<Block>`, evicting the block
/// farthest (by XOR proximity) from the local identity when full.
pub struct BlockStore {
    local_id: HashKey,
    config: StoreConfig,
    entries: HashMap<HashKey, Vec<Entry>>,
    len: usize,
}

impl BlockStore {
    pub fn new(local_id: HashKey, config: StoreConfig) -> Result<Self, StoreError> {
        if config.capacity == 0 {
            return Err(StoreError::ZeroCapacity);
        }
        Ok(BlockStore {
            local_id,
            config,
            entries: HashMap::new(),
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn proximity_of(&self, key: &HashKey) -> u32 {
        xor(key, &self.local_id).leading_zero_bits()
    }

    /// Insert a block, evicting the lowest-proximity (farthest) entry if
    /// the store is at capacity. Always succeeds.
    pub fn put(&mut self, block: Block) {
        if self.len >= self.config.capacity {
            self.evict_one();
        }
        let proximity = self.proximity_of(&block.key);
        let key = block.key;
        self.entries
            .entry(key)
            .or_default()
            .push(Entry { block, proximity });
        self.len += 1;
        trace!(?key, proximity, "block stored");
    }

    /// Evict the single farthest (lowest `leading_zero_bits`) entry,
    /// breaking ties by earliest expiration (spec §4.B).
    fn evict_one(&mut self) {
        let mut worst: Option<(HashKey, usize, u32, DateTime<Utc>)> = None;
        for (key, bucket) in self.entries.iter() {
            for (idx, entry) in bucket.iter().enumerate() {
                let candidate = (*key, idx, entry.proximity, entry.block.expiration_time);
                worst = Some(match worst {
                    None => candidate,
                    Some(cur) => {
                        if candidate.2 < cur.2
                            || (candidate.2 == cur.2 && candidate.3 < cur.3)
                        {
                            candidate
                        } else {
                            cur
                        }
                    }
                });
            }
        }
        if let Some((key, idx, proximity, _)) = worst {
            if let Some(bucket) = self.entries.get_mut(&key) {
                bucket.remove(idx);
                self.len -= 1;
                debug!(?key, proximity, "evicted farthest block to enforce capacity");
                if bucket.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Look up blocks by key and type, skipping expired entries and any
    /// whose content hash tests positive against `reply_filter`.
    pub fn get<'a>(
        &'a self,
        key: &HashKey,
        block_type: BlockType,
        now: DateTime<Utc>,
        reply_filter: &dyn ReplyFilter,
    ) -> Vec<&'a Block> {
        self.entries
            .get(key)
            .into_iter()
            .flatten()
            .map(|e| &e.block)
            .filter(|b| b.block_type == block_type)
            .filter(|b| !b.is_expired(now))
            .filter(|b| !reply_filter.contains(&b.content_hash()))
            .collect()
    }

    /// Return up to `n` stored blocks of `block_type` whose key is
    /// lexicographically closest in XOR distance to `target`, across the
    /// whole store (spec §4.B). Distance is the full 512-bit XOR value
    /// compared as an unsigned integer, not its leading-zero-bit count:
    /// two keys sharing a prefix can still differ in true distance.
    pub fn get_closest(&self, target: &HashKey, block_type: BlockType, n: usize) -> Vec<&Block> {
        let mut candidates: Vec<(HashKey, &Block)> = self
            .entries
            .values()
            .flatten()
            .map(|e| &e.block)
            .filter(|b| b.block_type == block_type)
            .map(|b| (xor(&b.key, target), b))
            .collect();
        // Smaller XOR distance bytes == closer; sort ascending.
        candidates.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        candidates.into_iter().take(n).map(|(_, b)| b).collect()
    }
}
