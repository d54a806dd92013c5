//! Size-bounded, proximity-weighted block cache (spec §4.B).
//!
//! Grounded on `lib-storage::dht::storage` (capacity-bounded map with
//! eviction of the oldest/least-valuable entries on overflow) generalized
//! from byte-capacity eviction to the spec's XOR-proximity eviction policy,
//! and on `lib-storage::dht::peer_registry` for the closeness-ordering
//! helper used by `get_closest`.

mod block;
mod store;

pub use block::{Block, BlockType, PathEntry};
pub use store::{BlockStore, NoFilter, ReplyFilter, StoreConfig, StoreError};
