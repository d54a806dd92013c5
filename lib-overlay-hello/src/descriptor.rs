use crate::error::HelloError;
use chrono::{DateTime, Utc};
use lib_overlay_crypto::{hash, verify, HashKey, Purpose, PublicKey, Signature};

/// A signed peer descriptor: identity, expiration, and transport addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub pid: PublicKey,
    pub expiration_time: DateTime<Utc>,
    pub addresses: Vec<String>,
    pub sig: Signature,
}

impl Descriptor {
    /// `H(concatenated address strings including trailing NUL)`, the
    /// payload the signature actually covers (spec §3).
    pub fn address_hash(addresses: &[String]) -> HashKey {
        let mut buf = Vec::new();
        for addr in addresses {
            buf.extend_from_slice(addr.as_bytes());
            buf.push(0u8);
        }
        hash(&buf)
    }

    /// The bytes signed over: `expiration (8B BE micros) || address_hash`.
    pub fn signed_payload(expiration_time: DateTime<Utc>, addresses: &[String]) -> Vec<u8> {
        let micros = expiration_time.timestamp_micros();
        let mut buf = Vec::with_capacity(8 + 64);
        buf.extend_from_slice(&micros.to_be_bytes());
        buf.extend_from_slice(Self::address_hash(addresses).as_bytes());
        buf
    }

    /// Verify `sig` under `pid` over this descriptor's signed payload.
    pub fn verify(&self) -> Result<(), HelloError> {
        let payload = Self::signed_payload(self.expiration_time, &self.addresses);
        verify(&self.pid, Purpose::Hello, &payload, &self.sig).map_err(|_| HelloError::InvalidSignature)
    }
}
