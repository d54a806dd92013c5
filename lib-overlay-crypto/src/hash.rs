//! 512-bit hash keys and the Kademlia XOR metric.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;

/// Size in bytes of a [`HashKey`] (512 bits).
pub const HASH_KEY_LEN: usize = 64;

/// A 512-bit value: the namespace for all DHT keys and peer identity hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashKey(#[serde(with = "serde_bytes_64")] pub [u8; HASH_KEY_LEN]);

mod serde_bytes_64 {
    use super::HASH_KEY_LEN;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; HASH_KEY_LEN], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde::Serialize::serialize(&bytes[..], s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<[u8; HASH_KEY_LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        let v: Vec<u8> = serde::Deserialize::deserialize(d)?;
        if v.len() != HASH_KEY_LEN {
            return Err(serde::de::Error::invalid_length(v.len(), &"64 bytes"));
        }
        let mut out = [0u8; HASH_KEY_LEN];
        out.copy_from_slice(&v);
        Ok(out)
    }
}

impl HashKey {
    pub const ZERO: HashKey = HashKey([0u8; HASH_KEY_LEN]);

    pub fn from_bytes(bytes: [u8; HASH_KEY_LEN]) -> Self {
        HashKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_KEY_LEN] {
        &self.0
    }

    /// Number of leading zero bits in `self`, i.e. how many leading bits of
    /// two XOR'd hashes agree — the Kademlia bucket index and proximity
    /// measure in one. `leading_zero_bits(a XOR b) == 512` iff `a == b`.
    pub fn leading_zero_bits(&self) -> u32 {
        let mut bits = 0u32;
        for byte in self.0.iter() {
            if *byte == 0 {
                bits += 8;
                continue;
            }
            bits += byte.leading_zeros();
            break;
        }
        bits
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Bitwise XOR of two hash keys — the Kademlia distance metric.
pub fn xor(a: &HashKey, b: &HashKey) -> HashKey {
    let mut out = [0u8; HASH_KEY_LEN];
    for i in 0..HASH_KEY_LEN {
        out[i] = a.0[i] ^ b.0[i];
    }
    HashKey(out)
}

/// Hash arbitrary bytes into a [`HashKey`] via SHA-512.
pub fn hash(bytes: &[u8]) -> HashKey {
    let digest = Sha512::digest(bytes);
    let mut out = [0u8; HASH_KEY_LEN];
    out.copy_from_slice(&digest);
    HashKey(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_self_is_zero() {
        let h = hash(b"peer-a");
        assert_eq!(xor(&h, &h), HashKey::ZERO);
    }

    #[test]
    fn leading_zero_bits_of_zero_is_full_width() {
        assert_eq!(HashKey::ZERO.leading_zero_bits(), 512);
    }

    #[test]
    fn leading_zero_bits_equal_iff_equal() {
        let a = hash(b"alpha");
        let b = hash(b"beta");
        assert_ne!(xor(&a, &b).leading_zero_bits(), 512);
        assert_eq!(xor(&a, &a).leading_zero_bits(), 512);
    }

    #[test]
    fn xor_is_symmetric() {
        let a = hash(b"alpha");
        let b = hash(b"beta");
        assert_eq!(xor(&a, &b), xor(&b, &a));
    }

    #[test]
    fn hash_is_deterministic_and_sensitive() {
        assert_eq!(hash(b"same"), hash(b"same"));
        assert_ne!(hash(b"same"), hash(b"different"));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn triangle_inequality_holds(a in prop::collection::vec(any::<u8>(), 1..32),
                                      b in prop::collection::vec(any::<u8>(), 1..32),
                                      c in prop::collection::vec(any::<u8>(), 1..32)) {
            // Kademlia's closeness measure is ordered by leading_zero_bits
            // (higher = closer); the metric distance is 512 - leading_zero_bits.
            let ha = hash(&a);
            let hb = hash(&b);
            let hc = hash(&c);
            let d_ab = 512 - xor(&ha, &hb).leading_zero_bits();
            let d_bc = 512 - xor(&hb, &hc).leading_zero_bits();
            let d_ac = 512 - xor(&ha, &hc).leading_zero_bits();
            // XOR metric triangle inequality: d(a,c) <= d(a,b) + d(b,c) in the
            // ultrametric sense d(a,c) <= max(d(a,b), d(b,c)), which implies
            // the weaker additive form used here.
            prop_assert!(d_ac <= d_ab.max(d_bc).max(d_ab + d_bc));
        }
    }
}
