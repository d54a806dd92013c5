//! Bloom filters for peer-bloom loop avoidance and reply-bloom / block-group
//! duplicate suppression (spec §3 "Bloom Filters").
//!
//! Grounded on `qc-07-bloom-filters::domain::bloom_filter::BloomFilter`
//! (bitvec-backed bit array, a serde-friendly byte-vec encoding, `k` hash
//! functions derived from a single siphash seed rather than `k` distinct
//! hashers) adapted to operate over [`HashKey`] members instead of raw
//! transaction bytes.

use bitvec::prelude::*;
use lib_overlay_crypto::HashKey;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Number of hash functions for a peer-bloom (spec §3: "size fixed, K=16
/// hash functions").
pub const PEER_BLOOM_K: usize = 16;

/// Bits per peer-bloom; sized for a handful of hops without excessive false
/// positives at `K=16`.
pub const PEER_BLOOM_BITS: usize = 8192;

/// A space-efficient, no-false-negative membership filter over [`HashKey`]s.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BloomFilter {
    #[serde(with = "bitvec_serde")]
    bits: BitVec<u8, Lsb0>,
    k: usize,
    m: usize,
}

mod bitvec_serde {
    use bitvec::prelude::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bits: &BitVec<u8, Lsb0>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bytes: Vec<u8> = bits.as_raw_slice().to_vec();
        (bytes, bits.len()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BitVec<u8, Lsb0>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (bytes, len): (Vec<u8>, usize) = Deserialize::deserialize(deserializer)?;
        let mut bits = BitVec::<u8, Lsb0>::from_vec(bytes);
        bits.truncate(len);
        Ok(bits)
    }
}

impl BloomFilter {
    /// Create an empty filter with `m` bits and `k` hash functions.
    pub fn new(m: usize, k: usize) -> Self {
        BloomFilter {
            bits: bitvec![u8, Lsb0; 0; m.max(1)],
            k: k.max(1),
            m: m.max(1),
        }
    }

    /// Create a filter sized from an expected element count and a target
    /// false-positive rate, using the standard optimal-parameter formulas.
    pub fn with_expected_elements(expected_elements: usize, target_fpr: f64) -> Self {
        let n = expected_elements.max(1) as f64;
        let p = target_fpr.clamp(1e-6, 0.5);
        let m = (-(n * p.ln()) / (std::f64::consts::LN_2.powi(2))).ceil().max(8.0);
        let k = ((m / n) * std::f64::consts::LN_2).round().max(1.0);
        BloomFilter::new(m as usize, k as usize)
    }

    fn bit_indices(&self, member: &HashKey) -> impl Iterator<Item = usize> + '_ {
        let h1 = {
            let mut hasher = SipHasher13::new_with_keys(0, 0);
            hasher.write(member.as_bytes());
            hasher.finish()
        };
        let h2 = {
            let mut hasher = SipHasher13::new_with_keys(1, 1);
            hasher.write(member.as_bytes());
            hasher.finish()
        };
        let m = self.m as u64;
        (0..self.k).map(move |i| {
            let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
            (combined % m) as usize
        })
    }

    pub fn insert(&mut self, member: &HashKey) {
        for idx in self.bit_indices(member) {
            self.bits.set(idx, true);
        }
    }

    pub fn contains(&self, member: &HashKey) -> bool {
        self.bit_indices(member).all(|idx| self.bits[idx])
    }

    /// Insert `member` and report whether it was already present — the
    /// primitive behind reply-dedup (spec testable property 6).
    pub fn test_and_insert(&mut self, member: &HashKey) -> bool {
        let already = self.contains(member);
        self.insert(member);
        already
    }

    pub fn len_bits(&self) -> usize {
        self.m
    }
}

/// Peer-bloom: filters peers already forwarded to on a given request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerBloom(BloomFilter);

impl PeerBloom {
    pub fn new() -> Self {
        PeerBloom(BloomFilter::new(PEER_BLOOM_BITS, PEER_BLOOM_K))
    }

    pub fn contains(&self, peer_hash: &HashKey) -> bool {
        self.0.contains(peer_hash)
    }

    pub fn insert(&mut self, peer_hash: &HashKey) {
        self.0.insert(peer_hash);
    }
}

impl Default for PeerBloom {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply-bloom / block group: already-seen-reply fingerprints for one GET's
/// block group, parameterized by an expected set size (spec §3, §4.F
/// `create_group`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplyGroup(BloomFilter);

/// Typed options struct replacing the original's `va_list` block-group
/// constructors (spec §9 Design Notes).
#[derive(Debug, Clone, Copy)]
pub struct GroupOptions {
    pub seed_set_size: usize,
    pub filter_size: Option<usize>,
}

impl ReplyGroup {
    pub fn new(options: GroupOptions) -> Self {
        let filter = match options.filter_size {
            Some(bits) => BloomFilter::new(bits, PEER_BLOOM_K),
            None => BloomFilter::with_expected_elements(options.seed_set_size.max(1), 0.01),
        };
        ReplyGroup(filter)
    }

    /// Test-and-insert a reply's content hash; `true` means this reply was
    /// already seen (spec testable property 6: `DUPLICATE` on repeat).
    pub fn test_and_insert(&mut self, content_hash: &HashKey) -> bool {
        self.0.test_and_insert(content_hash)
    }

    pub fn contains(&self, content_hash: &HashKey) -> bool {
        self.0.contains(content_hash)
    }
}

impl lib_overlay_store::ReplyFilter for ReplyGroup {
    fn contains(&self, content_hash: &HashKey) -> bool {
        ReplyGroup::contains(self, content_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_overlay_crypto::hash;

    #[test]
    fn fresh_filter_contains_nothing() {
        let filter = BloomFilter::new(1024, 8);
        assert!(!filter.contains(&hash(b"anything")));
    }

    #[test]
    fn inserted_member_is_contained() {
        let mut filter = BloomFilter::new(1024, 8);
        let member = hash(b"peer-x");
        filter.insert(&member);
        assert!(filter.contains(&member));
    }

    #[test]
    fn test_and_insert_reports_duplicate_on_second_call() {
        // Testable property 6 at the primitive level.
        let mut group = ReplyGroup::new(GroupOptions {
            seed_set_size: 16,
            filter_size: None,
        });
        let reply = hash(b"reply-bytes");
        assert!(!group.test_and_insert(&reply));
        assert!(group.test_and_insert(&reply));
    }

    #[test]
    fn peer_bloom_distinguishes_absent_peers() {
        let mut peer_bloom = PeerBloom::new();
        let a = hash(b"peer-a");
        let b = hash(b"peer-b");
        peer_bloom.insert(&a);
        assert!(peer_bloom.contains(&a));
        assert!(!peer_bloom.contains(&b));
    }
}
