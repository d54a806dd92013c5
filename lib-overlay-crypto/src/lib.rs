//! Crypto primitives for the overlay: EdDSA signatures, SHA-512 hash keys,
//! and the XOR proximity metric Kademlia routing is built on.
//!
//! Grounded on the teacher's `lib-crypto::classical::ed25519` wrapper
//! (sign/verify over raw byte slices, `anyhow`-free `Result<bool>` verify)
//! and `lib-identity::types::node_id` (domain-separated, versioned hashing
//! of identity material). The 256-bit `NodeId` there becomes a 512-bit
//! `HashKey` here per the spec's explicit SHA-512 identity hash.

mod hash;
mod keypair;
mod purpose;
mod signature;

pub use hash::{xor, HashKey, HASH_KEY_LEN};
pub use keypair::{KeyPair, PrivateKey, PublicKey};
pub use purpose::Purpose;
pub use signature::Signature;

use thiserror::Error;

/// Closed error taxonomy for the crypto layer (spec §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed key material: {0}")]
    Malformed(&'static str),
}

/// Hash arbitrary bytes into a 512-bit `HashKey` (SHA-512).
pub fn hash(bytes: &[u8]) -> HashKey {
    hash::hash(bytes)
}

/// Derive the DHT key for a user-block: `H(verification_key)`, where
/// `verification_key` is itself derived from the owning zone key and label.
///
/// GNS-style zone derivation (HKDF over `zone_pub || label`) is out of scope
/// for this crate's Non-goals (application-level record semantics); we
/// derive the verification key the same way the spec's invariant states it
/// is used — hashed into the block key, nothing more.
pub fn derive_block_key(zone_pub: &PublicKey, label: &str) -> HashKey {
    let mut buf = Vec::with_capacity(32 + label.len());
    buf.extend_from_slice(zone_pub.as_bytes());
    buf.extend_from_slice(label.as_bytes());
    hash::hash(&buf)
}

/// Sign `bytes` under `purpose`'s domain separation tag.
pub fn sign(priv_key: &PrivateKey, purpose: Purpose, bytes: &[u8]) -> Signature {
    signature::sign(priv_key, purpose, bytes)
}

/// Verify `sig` over `bytes` under `purpose`, for `pub_key`.
///
/// Returns `Err(CryptoError::InvalidSignature)` on any mismatch: wrong key,
/// wrong purpose tag, or tampered bytes all fail identically, per spec §4.A
/// ("Fails with `InvalidSignature` on any tampering").
pub fn verify(
    pub_key: &PublicKey,
    purpose: Purpose,
    bytes: &[u8],
    sig: &Signature,
) -> Result<(), CryptoError> {
    signature::verify(pub_key, purpose, bytes, sig)
}
