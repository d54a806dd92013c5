//! Zone-master publication pipeline: namestore monitor events become
//! signed DHT PUTs, gated by tombstone suppression and an in-flight cap
//! (spec §4.G).

use crate::namestore::{Record, ZoneEvent, ZoneMonitor};
use crate::tombstone;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lib_overlay_crypto::{derive_block_key, sign, KeyPair, Purpose};
use lib_overlay_dht::RouteOptions;
use lib_overlay_store::BlockType;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default replication level for zone-master publications (spec §4.G step
/// 4: "publish via E.PUT with replication level 5").
pub const ZONE_PUT_REPLICATION: u32 = 5;

/// Maximum PUTs the publisher keeps in flight before cancelling the oldest
/// (spec §4.G "DHT_QUEUE_LIMIT (2000)").
pub const DHT_QUEUE_LIMIT: usize = 2000;

/// Steady-state namestore monitor credit window (spec §4.G
/// "NAMESTORE_QUEUE_LIMIT (5)").
pub const NAMESTORE_QUEUE_LIMIT: u32 = 5;

/// Opaque identifier for one outstanding PUT, returned by [`DhtPutSink::put`]
/// (spec §6 "Publisher → DHT: put(...) → handle").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PutHandle(pub u64);

/// The DHT-facing half of the publisher's interface (spec §6 "Publisher →
/// DHT"), kept separate from `lib-overlay-dht::DhtRouter` so the publisher
/// can be tested without a live router.
#[async_trait]
pub trait DhtPutSink: Send + Sync {
    async fn put(
        &self,
        key: lib_overlay_crypto::HashKey,
        block_type: BlockType,
        data: Vec<u8>,
        expiration: DateTime<Utc>,
        replication: u32,
        options: RouteOptions,
    ) -> PutHandle;

    /// Cancel a previously issued PUT. The router treats PUTs as opaque and
    /// fire-and-forget (spec §5 "the router treats PUTs as opaque"), so this
    /// is best-effort and never fails.
    async fn cancel(&self, handle: PutHandle);
}

/// An in-memory `DhtPutSink` for tests: allocates sequential handles and
/// records every put/cancel call.
#[derive(Default)]
pub struct RecordingPutSink {
    next_handle: std::sync::atomic::AtomicU64,
    puts: std::sync::Mutex<Vec<(PutHandle, lib_overlay_crypto::HashKey, BlockType, DateTime<Utc>)>>,
    cancelled: std::sync::Mutex<Vec<PutHandle>>,
}

impl RecordingPutSink {
    pub fn new() -> Self {
        RecordingPutSink::default()
    }

    pub fn puts(&self) -> Vec<(PutHandle, lib_overlay_crypto::HashKey, BlockType, DateTime<Utc>)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<PutHandle> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl DhtPutSink for RecordingPutSink {
    async fn put(
        &self,
        key: lib_overlay_crypto::HashKey,
        block_type: BlockType,
        data: Vec<u8>,
        expiration: DateTime<Utc>,
        _replication: u32,
        _options: RouteOptions,
    ) -> PutHandle {
        let _ = data;
        let id = self.next_handle.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let handle = PutHandle(id);
        self.puts.lock().unwrap().push((handle, key, block_type, expiration));
        handle
    }

    async fn cancel(&self, handle: PutHandle) {
        self.cancelled.lock().unwrap().push(handle);
    }
}

/// Adapts a live [`lib_overlay_dht::DhtRouter`] to [`DhtPutSink`]. The
/// router's PUT path is fire-and-forget (spec §5 "the router treats PUTs as
/// opaque"), so `cancel` only drops the publisher's own bookkeeping; there is
/// no in-flight network operation to tear down.
pub struct RouterPutSink {
    router: Arc<tokio::sync::Mutex<lib_overlay_dht::DhtRouter>>,
    next_handle: std::sync::atomic::AtomicU64,
}

impl RouterPutSink {
    pub fn new(router: Arc<tokio::sync::Mutex<lib_overlay_dht::DhtRouter>>) -> Self {
        RouterPutSink {
            router,
            next_handle: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl DhtPutSink for RouterPutSink {
    async fn put(
        &self,
        key: lib_overlay_crypto::HashKey,
        block_type: BlockType,
        data: Vec<u8>,
        expiration: DateTime<Utc>,
        replication: u32,
        options: RouteOptions,
    ) -> PutHandle {
        self.router
            .lock()
            .await
            .put_local(key, block_type, data, expiration, replication, options)
            .await;
        let id = self.next_handle.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        PutHandle(id)
    }

    async fn cancel(&self, _handle: PutHandle) {}
}

#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig {
    pub dht_queue_limit: usize,
    pub namestore_queue_limit: u32,
    pub replication: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            dht_queue_limit: DHT_QUEUE_LIMIT,
            namestore_queue_limit: NAMESTORE_QUEUE_LIMIT,
            replication: ZONE_PUT_REPLICATION,
        }
    }
}

struct InFlightPut {
    handle: PutHandle,
    label: String,
    expiration: DateTime<Utc>,
}

/// Drops private and already-expired records from `records`, keeping the
/// rest with their critical flag untouched (spec §4.G step 1). Returns
/// `None` if nothing remains to publish.
fn public_projection(records: &[Record], now: DateTime<Utc>) -> Option<(Vec<&Record>, DateTime<Utc>)> {
    let kept: Vec<&Record> = records
        .iter()
        .filter(|r| !r.private)
        .filter(|r| r.expiration > now)
        .collect();
    if kept.is_empty() {
        return None;
    }
    let latest_expiration = kept.iter().map(|r| r.expiration).max().expect("non-empty");
    Some((kept, latest_expiration))
}

/// Serializes a label's public record set into the block payload covered by
/// the signature, in the order the records were filtered.
fn encode_payload(zone: &lib_overlay_crypto::PublicKey, label: &str, records: &[&Record]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(zone.as_bytes());
    out.extend_from_slice(&(label.len() as u32).to_be_bytes());
    out.extend_from_slice(label.as_bytes());
    out.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for record in records {
        out.extend_from_slice(&(record.value.len() as u32).to_be_bytes());
        out.extend_from_slice(&record.value);
        out.push(record.critical as u8);
    }
    out
}

/// Zone-master publisher: consumes namestore monitor events and turns each
/// into a validator-acceptable `GnsRecord` block PUT, subject to tombstone
/// suppression (spec §4.G).
pub struct Publisher<M: ZoneMonitor, S: DhtPutSink> {
    zone_keypair: KeyPair,
    monitor: Arc<M>,
    sink: Arc<S>,
    config: PublisherConfig,
    in_flight: VecDeque<InFlightPut>,
}

impl<M: ZoneMonitor, S: DhtPutSink> Publisher<M, S> {
    pub fn new(zone_keypair: KeyPair, monitor: Arc<M>, sink: Arc<S>, config: PublisherConfig) -> Self {
        Publisher {
            zone_keypair,
            monitor,
            sink,
            config,
            in_flight: VecDeque::new(),
        }
    }

    /// Open the namestore monitor's initial credit window (spec §4.G
    /// "NAMESTORE_QUEUE_LIMIT").
    pub async fn start(&self) {
        self.monitor.monitor_next(self.config.namestore_queue_limit).await;
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Process one namestore monitor event end to end (spec §4.G steps
    /// 1-5), then request one more unit of monitor credit.
    pub async fn handle_event(&mut self, event: ZoneEvent) {
        self.process_event(&event).await;
        self.monitor.monitor_next(1).await;
    }

    async fn process_event(&mut self, event: &ZoneEvent) {
        let now = Utc::now();
        let Some((public_records, projected_expiration)) = public_projection(&event.records, now) else {
            debug!(zone = ?event.zone, label = %event.label, "no public records remain, nothing to publish");
            return;
        };

        let existing_tombstone = self.monitor.tombstone(&event.zone, &event.label).await;
        if tombstone::should_skip(existing_tombstone, projected_expiration) {
            info!(zone = ?event.zone, label = %event.label, "tombstone_skip");
            return;
        }

        let key = derive_block_key(&event.zone, &event.label);
        let payload = encode_payload(&event.zone, &event.label, &public_records);
        let signature = sign(self.zone_keypair.private(), Purpose::ZoneBlock, &payload);
        let mut block_bytes = Vec::with_capacity(32 + 64 + payload.len());
        block_bytes.extend_from_slice(self.zone_keypair.public().as_bytes());
        block_bytes.extend_from_slice(signature.as_bytes());
        block_bytes.extend_from_slice(&payload);

        if self.in_flight.len() >= self.config.dht_queue_limit {
            if let Some(oldest) = self.in_flight.pop_front() {
                warn!(label = %oldest.label, "put_cancelled");
                self.sink.cancel(oldest.handle).await;
            }
        }

        let handle = self
            .sink
            .put(
                key,
                BlockType::GnsRecord,
                block_bytes,
                projected_expiration,
                self.config.replication,
                RouteOptions {
                    demultiplex_everywhere: true,
                    record_route: false,
                },
            )
            .await;
        info!(zone = ?event.zone, label = %event.label, expiration = %projected_expiration, "put_issued");
        self.in_flight.push_back(InFlightPut {
            handle,
            label: event.label.clone(),
            expiration: projected_expiration,
        });

        if let Err(e) = self
            .monitor
            .write_tombstone(event.zone, event.label.clone(), projected_expiration)
            .await
        {
            warn!(?e, zone = ?event.zone, label = %event.label, "failed to refresh tombstone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namestore::InMemoryZoneMonitor;
    use chrono::Duration;

    fn record(value: &[u8], expires_in: Duration, private: bool) -> Record {
        Record {
            value: value.to_vec(),
            expiration: Utc::now() + expires_in,
            private,
            critical: false,
        }
    }

    fn publisher(config: PublisherConfig) -> (Publisher<InMemoryZoneMonitor, RecordingPutSink>, Arc<InMemoryZoneMonitor>, Arc<RecordingPutSink>) {
        let monitor = Arc::new(InMemoryZoneMonitor::new());
        let sink = Arc::new(RecordingPutSink::new());
        let publisher = Publisher::new(KeyPair::generate(), monitor.clone(), sink.clone(), config);
        (publisher, monitor, sink)
    }

    #[tokio::test]
    async fn start_opens_the_namestore_credit_window() {
        let (publisher, monitor, _sink) = publisher(PublisherConfig::default());
        publisher.start().await;
        assert_eq!(monitor.credit_grants(), vec![NAMESTORE_QUEUE_LIMIT]);
    }

    #[tokio::test]
    async fn fresh_event_with_no_tombstone_issues_a_put_and_writes_a_tombstone() {
        let (mut publisher, monitor, sink) = publisher(PublisherConfig::default());
        let zone = *KeyPair::generate().public();
        let event = ZoneEvent {
            zone,
            label: "www".to_string(),
            records: vec![record(b"1.2.3.4", Duration::seconds(3600), false)],
        };
        publisher.handle_event(event).await;

        assert_eq!(sink.puts().len(), 1);
        let (_, _, block_type, _) = sink.puts()[0];
        assert_eq!(block_type, BlockType::GnsRecord);
        assert!(monitor.tombstone(&zone, "www").await.is_some());
        assert_eq!(monitor.credit_grants(), vec![1]);
    }

    #[tokio::test]
    async fn private_records_are_dropped_before_publication() {
        let (mut publisher, _monitor, sink) = publisher(PublisherConfig::default());
        let zone = *KeyPair::generate().public();
        let event = ZoneEvent {
            zone,
            label: "secret".to_string(),
            records: vec![record(b"private-value", Duration::seconds(3600), true)],
        };
        publisher.handle_event(event).await;
        assert!(sink.puts().is_empty());
    }

    #[tokio::test]
    async fn expired_records_are_dropped_before_publication() {
        let (mut publisher, _monitor, sink) = publisher(PublisherConfig::default());
        let zone = *KeyPair::generate().public();
        let event = ZoneEvent {
            zone,
            label: "stale".to_string(),
            records: vec![record(b"old-value", Duration::seconds(-60), false)],
        };
        publisher.handle_event(event).await;
        assert!(sink.puts().is_empty());
    }

    /// Scenario S5: after a successful publish, an identical re-fired event
    /// is suppressed by the tombstone written on the first pass.
    #[tokio::test]
    async fn s5_repeated_event_with_unchanged_record_set_is_tombstone_skipped() {
        let (mut publisher, _monitor, sink) = publisher(PublisherConfig::default());
        let zone = *KeyPair::generate().public();
        let event = ZoneEvent {
            zone,
            label: "www".to_string(),
            records: vec![record(b"1.2.3.4", Duration::seconds(3600), false)],
        };
        publisher.handle_event(event.clone()).await;
        assert_eq!(sink.puts().len(), 1);

        publisher.handle_event(event).await;
        assert_eq!(sink.puts().len(), 1, "second identical event must not re-publish");
    }

    /// Testable property 8: the in-flight cap evicts the oldest PUT.
    #[tokio::test]
    async fn dht_queue_limit_cancels_oldest_put_on_overflow() {
        let (mut publisher, _monitor, sink) = publisher(PublisherConfig {
            dht_queue_limit: 2,
            ..PublisherConfig::default()
        });
        let zone = *KeyPair::generate().public();
        for label in ["a", "b", "c"] {
            let event = ZoneEvent {
                zone,
                label: label.to_string(),
                records: vec![record(b"v", Duration::seconds(3600), false)],
            };
            publisher.handle_event(event).await;
        }
        assert_eq!(publisher.in_flight_count(), 2);
        assert_eq!(sink.puts().len(), 3);
        let cancelled = sink.cancelled();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0], sink.puts()[0].0, "the oldest put must be the one cancelled");
    }
}
