//! EdDSA sign/verify with 32-bit purpose-tag domain separation.
//!
//! Grounded on `lib-crypto::classical::ed25519::{ed25519_sign,
//! ed25519_verify}`: sign over raw bytes, verify returns a boolean rather
//! than bubbling up dalek's error type. We additionally prefix the signed
//! payload with a `(purpose, size)` header per spec §6 ("Signatures embed a
//! 32-bit `purpose` tag and a 32-bit `size`").

use super::keypair::{signing_key_of, verifying_key_of};
use super::{CryptoError, Purpose};
use super::{PrivateKey, PublicKey};
use ed25519_dalek::{Signer, Verifier};

/// A raw 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Signature(#[serde(with = "serde_sig")] [u8; 64]);

mod serde_sig {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&bytes[..], s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let v: Vec<u8> = serde::Deserialize::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 64 bytes"))
    }
}

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Signature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..8]))
    }
}

/// Build the purpose-tagged payload that is actually signed: `purpose(4B
/// BE) || size(4B BE, = 8 + payload.len()) || payload`.
fn tagged_payload(purpose: Purpose, payload: &[u8]) -> Vec<u8> {
    let size = 8u32 + payload.len() as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&purpose.to_be_bytes());
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn sign(priv_key: &PrivateKey, purpose: Purpose, payload: &[u8]) -> Signature {
    let signing_key = signing_key_of(priv_key);
    let tagged = tagged_payload(purpose, payload);
    let sig = signing_key.sign(&tagged);
    Signature(sig.to_bytes())
}

pub fn verify(
    pub_key: &PublicKey,
    purpose: Purpose,
    payload: &[u8],
    sig: &Signature,
) -> Result<(), CryptoError> {
    let verifying_key = verifying_key_of(pub_key);
    let tagged = tagged_payload(purpose, payload);
    let ed_sig = ed25519_dalek::Signature::from_bytes(&sig.0);
    verifying_key
        .verify(&tagged, &ed_sig)
        .map_err(|_| CryptoError::InvalidSignature)
}
