//! Block data model (spec §3 "Block").

use chrono::{DateTime, Utc};
use lib_overlay_crypto::{hash, HashKey, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// The small enum of block types this overlay validates and routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    /// File-sharing data block: content-addressed, `key = H(data)`.
    FsData,
    /// File-sharing index block: content-addressed, `key = H(data)`.
    FsIndex,
    /// A signed user-block: `key = H(verification_key)`.
    UserBlock,
    /// A GNS namerecord set published by a zone master.
    GnsRecord,
    /// A HELLO peer descriptor, gossiped through the DHT.
    Hello,
}

/// One hop of a put-path or get-path: the peer at that hop, and a signature
/// covering every prior entry plus this hop's peer identity (spec §3
/// "Put-path entries are monotone").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEntry {
    pub peer: PublicKey,
    pub signature: Signature,
}

/// An opaque, validated payload published or retrieved through the DHT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub key: HashKey,
    pub block_type: BlockType,
    pub expiration_time: DateTime<Utc>,
    pub data: Vec<u8>,
    pub put_path: Vec<PathEntry>,
    pub get_path: Vec<PathEntry>,
}

impl Block {
    pub fn new(key: HashKey, block_type: BlockType, expiration_time: DateTime<Utc>, data: Vec<u8>) -> Self {
        Block {
            key,
            block_type,
            expiration_time,
            data,
            put_path: Vec::new(),
            get_path: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }

    /// `H(reply_bytes)`: the fingerprint inserted into / tested against a
    /// GET's reply-bloom for duplicate suppression (spec §3 "Bloom
    /// Filters", "Reply-bloom").
    pub fn content_hash(&self) -> HashKey {
        hash(&self.data)
    }

    /// Key derivation for content-addressed block types (spec §3: "For
    /// file-sharing data/index blocks, key = H(`data`)").
    pub fn content_addressed_key(data: &[u8]) -> HashKey {
        hash(data)
    }
}
