//! HELLO peer descriptor builder/parser (spec §4.C).
//!
//! Grounded on `lib-network::dht::peer_discovery::ZhtpPeerInfo` for the
//! "serialize-without-signature, hash, sign" pattern and on
//! `lib-storage::dht::node::DhtNode`'s address list, generalized to the
//! spec's explicit binary-block and URI wire forms.

mod address;
mod base32;
mod build;
mod descriptor;
mod error;
mod wire;

pub use address::{validate_address, AddressError};
pub use descriptor::Descriptor;
pub use error::HelloError;
pub use wire::{to_env, HelloEnvelope};

use chrono::{DateTime, Utc};
use lib_overlay_crypto::{KeyPair, PublicKey};

/// Maximum number of addresses a descriptor may carry (spec §4.C
/// `TooManyAddresses`).
pub const MAX_ADDRESSES: usize = 65_535;

/// Build a descriptor and return it in binary-block form.
pub fn build_block(
    keypair: &KeyPair,
    addresses: &[String],
    expiration_time: DateTime<Utc>,
) -> Result<Vec<u8>, HelloError> {
    let descriptor = build::build_descriptor(keypair, addresses, expiration_time)?;
    Ok(build::to_block_bytes(&descriptor))
}

/// Build a descriptor and return it in URI form.
pub fn build_url(
    keypair: &KeyPair,
    addresses: &[String],
    expiration_time: DateTime<Utc>,
) -> Result<String, HelloError> {
    let descriptor = build::build_descriptor(keypair, addresses, expiration_time)?;
    Ok(build::to_url_string(&descriptor))
}

/// Parse a binary HELLO block, verifying signature and expiration.
pub fn parse_block(bytes: &[u8], now: DateTime<Utc>) -> Result<Descriptor, HelloError> {
    let descriptor = build::from_block_bytes(bytes)?;
    verify_and_accept(descriptor, now)
}

/// Parse a `gnunet://hello/...` URI, verifying signature and expiration.
pub fn parse_url(url: &str, now: DateTime<Utc>) -> Result<Descriptor, HelloError> {
    let descriptor = build::from_url_string(url)?;
    verify_and_accept(descriptor, now)
}

fn verify_and_accept(descriptor: Descriptor, now: DateTime<Utc>) -> Result<Descriptor, HelloError> {
    descriptor.verify()?;
    if descriptor.expiration_time <= now {
        return Err(HelloError::Expired);
    }
    Ok(descriptor)
}

/// Expose the peer identity a descriptor was signed under, for callers that
/// only need the `pid` without fully destructuring it.
pub fn peer_of(descriptor: &Descriptor) -> &PublicKey {
    &descriptor.pid
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn addrs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_then_parse_block_round_trips() {
        let kp = KeyPair::generate();
        let expiration = Utc::now() + Duration::seconds(3600);
        let a = addrs(&["tcp://1.2.3.4:80", "udp://5.6.7.8:90"]);
        let block = build_block(&kp, &a, expiration).unwrap();
        let descriptor = parse_block(&block, Utc::now()).unwrap();
        assert_eq!(descriptor.pid, *kp.public());
        assert_eq!(descriptor.addresses, a);
    }

    #[test]
    fn build_then_parse_url_round_trips() {
        let kp = KeyPair::generate();
        let expiration = Utc::now() + Duration::seconds(3600);
        let a = addrs(&["tcp://1.2.3.4:80"]);
        let url = build_url(&kp, &a, expiration).unwrap();
        let descriptor = parse_url(&url, Utc::now()).unwrap();
        assert_eq!(descriptor.pid, *kp.public());
        assert_eq!(descriptor.addresses, a);
    }

    #[test]
    fn url_and_block_forms_agree() {
        let kp = KeyPair::generate();
        let expiration = Utc::now() + Duration::seconds(3600);
        let a = addrs(&["tcp://1.2.3.4:80", "quic://9.9.9.9:443"]);
        let url = build_url(&kp, &a, expiration).unwrap();
        let block = build_block(&kp, &a, expiration).unwrap();
        let from_url = parse_url(&url, Utc::now()).unwrap();
        let from_block = parse_block(&block, Utc::now()).unwrap();
        assert_eq!(from_url.pid, from_block.pid);
        assert_eq!(from_url.addresses, from_block.addresses);
        assert_eq!(from_url.expiration_time, from_block.expiration_time);
    }

    #[test]
    fn duplicate_addresses_are_deduplicated_preserving_order() {
        let kp = KeyPair::generate();
        let expiration = Utc::now() + Duration::seconds(3600);
        let a = addrs(&["tcp://1.2.3.4:80", "tcp://1.2.3.4:80", "udp://5.6.7.8:1"]);
        let block = build_block(&kp, &a, expiration).unwrap();
        let descriptor = parse_block(&block, Utc::now()).unwrap();
        assert_eq!(descriptor.addresses, addrs(&["tcp://1.2.3.4:80", "udp://5.6.7.8:1"]));
    }

    #[test]
    fn expired_descriptor_is_rejected() {
        let kp = KeyPair::generate();
        let expiration = Utc::now() - Duration::seconds(1);
        let a = addrs(&["tcp://1.2.3.4:80"]);
        let block = build_block(&kp, &a, expiration).unwrap();
        assert!(matches!(parse_block(&block, Utc::now()), Err(HelloError::Expired)));
    }

    #[test]
    fn tampered_block_fails_signature_verification() {
        let kp = KeyPair::generate();
        let expiration = Utc::now() + Duration::seconds(3600);
        let a = addrs(&["tcp://1.2.3.4:80"]);
        let mut block = build_block(&kp, &a, expiration).unwrap();
        let last = block.len() - 1;
        block[last] ^= 0xFF;
        assert!(matches!(
            parse_block(&block, Utc::now()),
            Err(HelloError::InvalidSignature)
        ));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_build_then_parse_round_trips(
            host in "[a-z0-9]{1,10}",
            port in 1u16..=65535,
            secs in 1i64..100_000,
        ) {
            let kp = KeyPair::generate();
            let expiration = Utc::now() + Duration::seconds(secs);
            let addresses = vec![format!("tcp://{host}:{port}")];
            let block = build_block(&kp, &addresses, expiration).unwrap();
            let descriptor = parse_block(&block, Utc::now()).unwrap();
            prop_assert_eq!(descriptor.pid, *kp.public());
            prop_assert_eq!(descriptor.addresses, addresses);
            prop_assert!(descriptor.verify().is_ok());
        }
    }

    #[test]
    fn too_many_addresses_is_rejected() {
        let kp = KeyPair::generate();
        let expiration = Utc::now() + Duration::seconds(3600);
        let a: Vec<String> = (0..=MAX_ADDRESSES).map(|i| format!("tcp://h{i}")).collect();
        assert!(matches!(
            build_block(&kp, &a, expiration),
            Err(HelloError::TooManyAddresses)
        ));
    }
}
