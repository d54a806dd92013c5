//! Zone-master publisher: watches a local zone's records for changes and
//! mirrors freshly-modified, non-private record sets into the DHT (spec
//! §4.G).

mod namestore;
mod publisher;
mod tombstone;

pub use namestore::{InMemoryZoneMonitor, NamestoreError, Record, ZoneEvent, ZoneMonitor};
pub use publisher::{
    DhtPutSink, Publisher, PublisherConfig, PutHandle, RecordingPutSink, RouterPutSink,
    DHT_QUEUE_LIMIT, NAMESTORE_QUEUE_LIMIT, ZONE_PUT_REPLICATION,
};
