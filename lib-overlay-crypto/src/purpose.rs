//! Domain-separation tags for signatures.
//!
//! Mirrors GNUnet's `GNUNET_SIGNATURE_PURPOSE_*` convention: every signed
//! payload is prefixed by a 32-bit purpose tag so a signature produced for
//! one protocol message can never be replayed as a different one.

/// A 32-bit domain-separation tag, network order on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Purpose {
    /// HELLO peer descriptor: `(expiration, H(addresses))`.
    Hello = 1,
    /// A single hop of a DHT PUT/GET path: `(prior_entries || next_peer)`.
    DhtPutPath = 2,
    /// A signed user-block header.
    UserBlock = 3,
    /// A zone-master published block.
    ZoneBlock = 4,
}

impl Purpose {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn to_be_bytes(self) -> [u8; 4] {
        self.tag().to_be_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purposes_are_distinct() {
        assert_ne!(Purpose::Hello.tag(), Purpose::DhtPutPath.tag());
        assert_ne!(Purpose::UserBlock.tag(), Purpose::ZoneBlock.tag());
    }
}
