use crate::build::to_url_string;
use crate::descriptor::Descriptor;
use serde::{Deserialize, Serialize};

/// Wraps a descriptor for peer-to-peer gossip (spec §4.C `to_env`): the
/// `HELLO_URI` message type, carrying `address_count` for quick capacity
/// decisions without re-parsing the URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloEnvelope {
    pub address_count: u16,
    pub uri: String,
}

pub fn to_env(descriptor: &Descriptor) -> HelloEnvelope {
    HelloEnvelope {
        address_count: descriptor.addresses.len() as u16,
        uri: to_url_string(descriptor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_descriptor;
    use chrono::{Duration, Utc};
    use lib_overlay_crypto::KeyPair;

    #[test]
    fn envelope_carries_matching_address_count() {
        let kp = KeyPair::generate();
        let addresses = vec!["tcp://1.2.3.4:1".to_string(), "udp://5.6.7.8:2".to_string()];
        let descriptor = build_descriptor(&kp, &addresses, Utc::now() + Duration::seconds(60)).unwrap();
        let env = to_env(&descriptor);
        assert_eq!(env.address_count, 2);
        assert!(env.uri.starts_with("gnunet://hello/"));
    }
}
