//! DHT P2P wire messages (spec §6): PUT, GET, RESULT.
//!
//! The fixed-width header fields (`type`, `options`, `desired_replication`,
//! `hop_count`) are encoded big-endian by hand, as the spec's byte layout
//! requires; the variable-length sections (bloom filter, paths, payload)
//! are `bincode`-encoded behind that header, matching `lib-storage`'s use
//! of `bincode` for its `DhtMessage` wire form.

use crate::bloom::PeerBloom;
use chrono::{DateTime, Utc};
use lib_overlay_store::{Block, BlockType, PathEntry};
use lib_overlay_crypto::HashKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("message shorter than fixed header")]
    ShortHeader,
    #[error("unknown block type tag {0}")]
    UnknownBlockType(u16),
    #[error("bincode decode failed: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
}

fn block_type_tag(t: BlockType) -> u16 {
    match t {
        BlockType::FsData => 0,
        BlockType::FsIndex => 1,
        BlockType::UserBlock => 2,
        BlockType::GnsRecord => 3,
        BlockType::Hello => 4,
    }
}

fn block_type_from_tag(tag: u16) -> Result<BlockType, WireError> {
    Ok(match tag {
        0 => BlockType::FsData,
        1 => BlockType::FsIndex,
        2 => BlockType::UserBlock,
        3 => BlockType::GnsRecord,
        4 => BlockType::Hello,
        other => return Err(WireError::UnknownBlockType(other)),
    })
}

/// Route options carried alongside PUT/GET, per §4.G ("route-option
/// `DEMULTIPLEX_EVERYWHERE`") and §5's path-tracking toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOptions {
    pub demultiplex_everywhere: bool,
    pub record_route: bool,
}

impl RouteOptions {
    pub const NONE: RouteOptions = RouteOptions {
        demultiplex_everywhere: false,
        record_route: false,
    };

    fn to_bits(self) -> u16 {
        (self.demultiplex_everywhere as u16) | ((self.record_route as u16) << 1)
    }

    fn from_bits(bits: u16) -> Self {
        RouteOptions {
            demultiplex_everywhere: bits & 0b01 != 0,
            record_route: bits & 0b10 != 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutMessage {
    pub block_type: BlockType,
    pub options: RouteOptions,
    pub desired_replication: u32,
    pub hop_count: u32,
    pub expiration_time: DateTime<Utc>,
    pub peer_bloom: PeerBloom,
    pub key: HashKey,
    pub put_path: Vec<PathEntry>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMessage {
    pub block_type: BlockType,
    pub options: RouteOptions,
    pub desired_replication: u32,
    pub hop_count: u32,
    pub bloom_mutator: u32,
    pub peer_bloom: PeerBloom,
    pub key: HashKey,
    pub xquery: Vec<u8>,
    /// Carried on the GET itself so a reply can be routed straight back by
    /// popping hops off the reversed path (spec §4.E "Reply routing").
    /// The minimal §6 wire sketch omits this field; see DESIGN.md for why
    /// this implementation carries it explicitly instead of relying on
    /// ephemeral per-hop state that would not survive a process restart.
    pub get_path: Vec<PathEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    pub block_type: BlockType,
    pub expiration_time: DateTime<Utc>,
    pub key: HashKey,
    pub put_path: Vec<PathEntry>,
    pub get_path: Vec<PathEntry>,
    pub payload: Vec<u8>,
}

impl ResultMessage {
    pub fn from_block(block: &Block, get_path: Vec<PathEntry>) -> Self {
        ResultMessage {
            block_type: block.block_type,
            expiration_time: block.expiration_time,
            key: block.key,
            put_path: block.put_path.clone(),
            get_path,
            payload: block.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DhtMessage {
    Put(PutMessage),
    Get(GetMessage),
    Result(ResultMessage),
    #[cfg(test)]
    TestMarker(u32),
}

impl DhtMessage {
    #[cfg(test)]
    pub fn test_marker(n: u32) -> Self {
        DhtMessage::TestMarker(n)
    }

    #[cfg(test)]
    pub fn test_marker_value(&self) -> Option<u32> {
        match self {
            DhtMessage::TestMarker(n) => Some(*n),
            _ => None,
        }
    }
}

/// Hand-rolled big-endian header shared by PUT and GET: `type(2) |
/// options(2) | desired_replication(4) | hop_count(4)`.
fn encode_header(block_type: BlockType, options: RouteOptions, desired_replication: u32, hop_count: u32) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[0..2].copy_from_slice(&block_type_tag(block_type).to_be_bytes());
    out[2..4].copy_from_slice(&options.to_bits().to_be_bytes());
    out[4..8].copy_from_slice(&desired_replication.to_be_bytes());
    out[8..12].copy_from_slice(&hop_count.to_be_bytes());
    out
}

fn decode_header(bytes: &[u8]) -> Result<(BlockType, RouteOptions, u32, u32), WireError> {
    if bytes.len() < 12 {
        return Err(WireError::ShortHeader);
    }
    let tag = u16::from_be_bytes([bytes[0], bytes[1]]);
    let options_bits = u16::from_be_bytes([bytes[2], bytes[3]]);
    let desired_replication = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let hop_count = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    Ok((
        block_type_from_tag(tag)?,
        RouteOptions::from_bits(options_bits),
        desired_replication,
        hop_count,
    ))
}

impl PutMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = encode_header(self.block_type, self.options, self.desired_replication, self.hop_count).to_vec();
        let rest = (
            self.expiration_time,
            &self.peer_bloom,
            &self.key,
            &self.put_path,
            &self.payload,
        );
        out.extend_from_slice(&bincode::serialize(&rest).expect("serializable"));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (block_type, options, desired_replication, hop_count) = decode_header(bytes)?;
        let (expiration_time, peer_bloom, key, put_path, payload): (
            DateTime<Utc>,
            PeerBloom,
            HashKey,
            Vec<PathEntry>,
            Vec<u8>,
        ) = bincode::deserialize(&bytes[12..])?;
        Ok(PutMessage {
            block_type,
            options,
            desired_replication,
            hop_count,
            expiration_time,
            peer_bloom,
            key,
            put_path,
            payload,
        })
    }
}

impl GetMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = encode_header(self.block_type, self.options, self.desired_replication, self.hop_count).to_vec();
        out.extend_from_slice(&self.bloom_mutator.to_be_bytes());
        let rest = (&self.peer_bloom, &self.key, &self.xquery, &self.get_path);
        out.extend_from_slice(&bincode::serialize(&rest).expect("serializable"));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let (block_type, options, desired_replication, hop_count) = decode_header(bytes)?;
        if bytes.len() < 16 {
            return Err(WireError::ShortHeader);
        }
        let bloom_mutator = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let (peer_bloom, key, xquery, get_path): (PeerBloom, HashKey, Vec<u8>, Vec<PathEntry>) =
            bincode::deserialize(&bytes[16..])?;
        Ok(GetMessage {
            block_type,
            options,
            desired_replication,
            hop_count,
            bloom_mutator,
            peer_bloom,
            key,
            xquery,
            get_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn put_message_round_trips_through_wire_bytes() {
        let msg = PutMessage {
            block_type: BlockType::FsData,
            options: RouteOptions {
                demultiplex_everywhere: true,
                record_route: false,
            },
            desired_replication: 4,
            hop_count: 1,
            expiration_time: Utc::now() + Duration::seconds(60),
            peer_bloom: PeerBloom::new(),
            key: HashKey::ZERO,
            put_path: Vec::new(),
            payload: vec![1, 2, 3],
        };
        let bytes = msg.to_bytes();
        let decoded = PutMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.block_type, msg.block_type);
        assert_eq!(decoded.options, msg.options);
        assert_eq!(decoded.desired_replication, msg.desired_replication);
        assert_eq!(decoded.hop_count, msg.hop_count);
        assert_eq!(decoded.payload, msg.payload);
    }

    #[test]
    fn get_message_round_trips_through_wire_bytes() {
        let msg = GetMessage {
            block_type: BlockType::UserBlock,
            options: RouteOptions::NONE,
            desired_replication: 2,
            hop_count: 0,
            bloom_mutator: 42,
            peer_bloom: PeerBloom::new(),
            key: HashKey::ZERO,
            xquery: vec![9, 9],
            get_path: Vec::new(),
        };
        let bytes = msg.to_bytes();
        let decoded = GetMessage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.bloom_mutator, 42);
        assert_eq!(decoded.xquery, msg.xquery);
    }

    #[test]
    fn decode_rejects_unknown_block_type_tag() {
        let mut bytes = vec![0u8; 20];
        bytes[0..2].copy_from_slice(&99u16.to_be_bytes());
        assert!(matches!(
            PutMessage::from_bytes(&bytes),
            Err(WireError::UnknownBlockType(99))
        ));
    }
}
