//! Kademlia DHT: neighbour table, PUT/GET router, block validator, and the
//! message-queue glue connecting them to an underlay (spec §4.D-§4.H).

mod bloom;
mod messages;
mod neighbour;
mod router;
mod transport;
mod validator;

pub use bloom::{BloomFilter, GroupOptions, PeerBloom, ReplyGroup, PEER_BLOOM_BITS, PEER_BLOOM_K};
pub use messages::{DhtMessage, GetMessage, PutMessage, ResultMessage, RouteOptions, WireError};
pub use neighbour::{NeighbourEntry, NeighbourTable, NeighbourTableConfig, DEFAULT_BUCKET_SIZE};
pub use router::{DhtRouter, RouterConfig};
pub use transport::{LocalInbox, LocalQueue, LocalTransport, PeerMessageQueue, TransportError};
pub use validator::{
    check_block, check_query, check_reply, create_group, derive_key, ReplyStatus, ValidatorError,
};
