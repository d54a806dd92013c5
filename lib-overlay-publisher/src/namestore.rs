//! The (out-of-scope) authoritative record store's zone-monitor interface,
//! modeled as a trait plus an in-memory test double (spec §4.G, §6
//! "Publisher → Namestore").
//!
//! Grounded on `lib-overlay-dht::transport::PeerMessageQueue`'s pattern of a
//! small `async_trait` abstracting an external subsystem the rest of the
//! crate is tested against without a real backing service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lib_overlay_crypto::PublicKey;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NamestoreError {
    #[error("namestore unavailable")]
    Unavailable,
}

/// One resource record within a label's set, projected to the fields the
/// publisher's filtering step needs (spec §4.G step 1). Application-level
/// record type/value semantics are a Non-goal; `value` is opaque.
#[derive(Debug, Clone)]
pub struct Record {
    pub value: Vec<u8>,
    pub expiration: DateTime<Utc>,
    pub private: bool,
    pub critical: bool,
}

/// One namestore monitor event: a label's full current record set (spec
/// §4.G "records in `{zone, label} → vector<rd>` format").
#[derive(Debug, Clone)]
pub struct ZoneEvent {
    pub zone: PublicKey,
    pub label: String,
    pub records: Vec<Record>,
}

/// The namestore surface the publisher drives: monitor flow control, the
/// authoritative record write-back, and the tombstone record used to
/// suppress redundant republication (spec §4.G steps 3 and 5).
#[async_trait]
pub trait ZoneMonitor: Send + Sync {
    /// Grant `credit` more monitor events before the stream pauses (spec §6
    /// `monitor_next(credit)`).
    async fn monitor_next(&self, credit: u32);

    /// Persist the projected public record set, mirroring `records_store`
    /// (spec §6). Not used for tombstone state.
    async fn records_store(
        &self,
        zone: PublicKey,
        label: String,
        records: Vec<Record>,
    ) -> Result<(), NamestoreError>;

    /// Write or refresh the label's tombstone, recording the expiration of
    /// the block that was just published (spec §4.G step 5).
    async fn write_tombstone(
        &self,
        zone: PublicKey,
        label: String,
        time_of_death: DateTime<Utc>,
    ) -> Result<(), NamestoreError>;

    /// The label's current tombstone, if any (spec §4.G step 3).
    async fn tombstone(&self, zone: &PublicKey, label: &str) -> Option<DateTime<Utc>>;
}

/// An in-memory `ZoneMonitor` for tests: records every `records_store` and
/// `monitor_next` call it receives and keeps tombstones in a plain map.
#[derive(Default)]
pub struct InMemoryZoneMonitor {
    tombstones: Mutex<HashMap<(PublicKey, String), DateTime<Utc>>>,
    stored: Mutex<Vec<(PublicKey, String, Vec<Record>)>>,
    credit_grants: Mutex<Vec<u32>>,
}

impl InMemoryZoneMonitor {
    pub fn new() -> Self {
        InMemoryZoneMonitor::default()
    }

    pub fn credit_grants(&self) -> Vec<u32> {
        self.credit_grants.lock().unwrap().clone()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }
}

#[async_trait]
impl ZoneMonitor for InMemoryZoneMonitor {
    async fn monitor_next(&self, credit: u32) {
        self.credit_grants.lock().unwrap().push(credit);
    }

    async fn records_store(
        &self,
        zone: PublicKey,
        label: String,
        records: Vec<Record>,
    ) -> Result<(), NamestoreError> {
        self.stored.lock().unwrap().push((zone, label, records));
        Ok(())
    }

    async fn write_tombstone(
        &self,
        zone: PublicKey,
        label: String,
        time_of_death: DateTime<Utc>,
    ) -> Result<(), NamestoreError> {
        self.tombstones.lock().unwrap().insert((zone, label), time_of_death);
        Ok(())
    }

    async fn tombstone(&self, zone: &PublicKey, label: &str) -> Option<DateTime<Utc>> {
        self.tombstones.lock().unwrap().get(&(*zone, label.to_string())).copied()
    }
}
