use crate::address::AddressError;
use thiserror::Error;

/// Closed error taxonomy for HELLO construction/parsing (spec §4.C).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HelloError {
    #[error("malformed address: {0}")]
    MalformedAddress(#[from] AddressError),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("descriptor has expired")]
    Expired,
    #[error("too many addresses (max 65535)")]
    TooManyAddresses,
    #[error("malformed descriptor: {0}")]
    Malformed(&'static str),
}

impl From<lib_overlay_crypto::CryptoError> for HelloError {
    fn from(_: lib_overlay_crypto::CryptoError) -> Self {
        HelloError::InvalidSignature
    }
}
