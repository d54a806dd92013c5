//! The DHT router: PUT/GET state machines, bloom-filter loop avoidance,
//! reply routing, and replication (spec §4.E).
//!
//! Grounded on `lib-storage::dht::replication::DhtReplication` for the
//! "replication factor drives a target fan-out count" shape (generalized
//! to the spec's `R = max(1, floor(desired_replication / (1+hop_count)))`
//! formula) and on `lib-storage::dht::routing` for the general idea of a
//! router owning the local store and the neighbour table as a single
//! `RouterCtx`-style struct (spec §9 Design Notes: "Global singletons →
//! context struct").

use crate::bloom::{GroupOptions, PeerBloom, ReplyGroup};
use crate::messages::{DhtMessage, GetMessage, PutMessage, ResultMessage, RouteOptions};
use crate::neighbour::NeighbourTable;
use crate::validator::{self, ReplyStatus};
use chrono::{DateTime, Duration, Utc};
use lib_overlay_crypto::{hash, sign, verify, HashKey, KeyPair, Purpose, PublicKey};
use lib_overlay_store::{Block, BlockStore, BlockType, NoFilter, PathEntry};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Runtime-tunable router parameters.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// `log2(estimated_network_size)` input to the PUT forwarding
    /// condition (spec §4.E). `None` defaults to the connected-peer count,
    /// the Open Question resolution recorded in DESIGN.md.
    pub estimated_network_size: Option<usize>,
    /// How long an outstanding GET's routing state lives before being
    /// reaped (spec §4.E "Timeouts").
    pub get_deadline: Duration,
    /// Expected element count handed to freshly created reply groups.
    pub default_group_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            estimated_network_size: None,
            get_deadline: Duration::seconds(30),
            default_group_size: 16,
        }
    }
}

struct OutstandingGet {
    block_type: BlockType,
    xquery: Vec<u8>,
    group: ReplyGroup,
    originator: mpsc::UnboundedSender<ResultMessage>,
    deadline: DateTime<Utc>,
}

/// The central DHT state machine: owns the local block cache and the
/// neighbour table, and drives PUT/GET/RESULT handling (spec §4.E, §5
/// "The block store is owned by the DHT router... The neighbour table is
/// owned by the router").
pub struct DhtRouter {
    local_keypair: KeyPair,
    config: RouterConfig,
    store: BlockStore,
    neighbours: NeighbourTable,
    outstanding_gets: HashMap<HashKey, Vec<OutstandingGet>>,
}

/// `R = max(1, floor(desired_replication / (1 + hop_count)))` (spec §4.E
/// "Replication policy").
fn replication_fan_out(desired_replication: u32, hop_count: u32) -> usize {
    (desired_replication / (1 + hop_count)).max(1) as usize
}

/// Append a path entry for the local hop: its signature covers the
/// concatenation of all prior entries' peer identities plus its own (spec
/// §3 "Put-path entries are monotone").
fn append_path_entry(keypair: &KeyPair, existing: &[PathEntry]) -> PathEntry {
    let mut payload = Vec::with_capacity(existing.len() * 32 + 32);
    for entry in existing {
        payload.extend_from_slice(entry.peer.as_bytes());
    }
    payload.extend_from_slice(keypair.public().as_bytes());
    let signature = sign(keypair.private(), Purpose::DhtPutPath, &payload);
    PathEntry {
        peer: *keypair.public(),
        signature,
    }
}

/// Verify the signature chain of a put/get path: each entry's signature
/// must cover exactly the concatenation of every entry before it.
fn verify_path(path: &[PathEntry]) -> bool {
    let mut payload = Vec::new();
    for entry in path {
        if verify(&entry.peer, Purpose::DhtPutPath, &payload, &entry.signature).is_err() {
            return false;
        }
        payload.extend_from_slice(entry.peer.as_bytes());
    }
    true
}

impl DhtRouter {
    pub fn new(local_keypair: KeyPair, store: BlockStore, neighbours: NeighbourTable, config: RouterConfig) -> Self {
        DhtRouter {
            local_keypair,
            config,
            store,
            neighbours,
            outstanding_gets: HashMap::new(),
        }
    }

    pub fn local_pid(&self) -> PublicKey {
        *self.local_keypair.public()
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn neighbours(&self) -> &NeighbourTable {
        &self.neighbours
    }

    pub fn neighbours_mut(&mut self) -> &mut NeighbourTable {
        &mut self.neighbours
    }

    fn estimated_network_size(&self) -> usize {
        self.config
            .estimated_network_size
            .unwrap_or_else(|| self.neighbours.len())
            .max(1)
    }

    /// Issue a PUT from a local client: builds the wire message at
    /// `hop_count=0` and runs it through the same logic a received PUT
    /// gets (spec §4.E).
    pub async fn put_local(
        &mut self,
        key: HashKey,
        block_type: BlockType,
        data: Vec<u8>,
        expiration_time: DateTime<Utc>,
        desired_replication: u32,
        options: RouteOptions,
    ) {
        let put = PutMessage {
            block_type,
            options,
            desired_replication,
            hop_count: 0,
            expiration_time,
            peer_bloom: PeerBloom::new(),
            key,
            put_path: Vec::new(),
            payload: data,
        };
        self.handle_put(put).await;
    }

    /// Handle a PUT received from a peer, or issued locally via
    /// [`DhtRouter::put_local`] (spec §4.E "PUT path").
    pub async fn handle_put(&mut self, put: PutMessage) {
        let log2_size = (self.estimated_network_size() as f64).log2();
        let am_closest = self.neighbours.am_closest(&put.key, &put.peer_bloom);

        if (put.hop_count as f64) < log2_size || !am_closest {
            let r = replication_fan_out(put.desired_replication, put.hop_count);
            let targets: Vec<(PublicKey, std::sync::Arc<dyn crate::transport::PeerMessageQueue>)> = self
                .neighbours
                .closest_peers(&put.key, r, &put.peer_bloom)
                .into_iter()
                .map(|e| (e.pid, e.queue.clone()))
                .collect();

            let mut peer_bloom = put.peer_bloom.clone();
            for (pid, _) in &targets {
                peer_bloom.insert(&hash(pid.as_bytes()));
            }

            let mut put_path = put.put_path.clone();
            if put.options.record_route {
                put_path.push(append_path_entry(&self.local_keypair, &put.put_path));
            }

            for (pid, queue) in targets {
                let forwarded = PutMessage {
                    block_type: put.block_type,
                    options: put.options,
                    desired_replication: put.desired_replication,
                    hop_count: put.hop_count + 1,
                    expiration_time: put.expiration_time,
                    peer_bloom: peer_bloom.clone(),
                    key: put.key,
                    put_path: put_path.clone(),
                    payload: put.payload.clone(),
                };
                trace!(?pid, key = %put.key, "forwarding PUT");
                let _ = queue.send(DhtMessage::Put(forwarded)).await;
            }
        }

        if am_closest {
            if let Err(e) = validator::check_block(put.block_type, &put.payload) {
                warn!(?e, key = %put.key, "rejecting PUT with invalid block");
                return;
            }
            let mut block = Block::new(put.key, put.block_type, put.expiration_time, put.payload);
            block.put_path = put.put_path;
            debug!(key = %block.key, block_type = ?block.block_type, "storing PUT locally");
            self.store.put(block);
        }
    }

    /// Issue a GET from a local client: registers outstanding routing
    /// state keyed by `key` and runs the GET through the same path a
    /// received GET gets (spec §4.E "GET path").
    pub async fn get_local(
        &mut self,
        key: HashKey,
        block_type: BlockType,
        xquery: Vec<u8>,
        desired_replication: u32,
        originator: mpsc::UnboundedSender<ResultMessage>,
    ) {
        let group = validator::create_group(
            block_type,
            &[],
            GroupOptions {
                seed_set_size: self.config.default_group_size,
                filter_size: None,
            },
        );
        self.outstanding_gets.entry(key).or_default().push(OutstandingGet {
            block_type,
            xquery: xquery.clone(),
            group,
            originator,
            deadline: Utc::now() + self.config.get_deadline,
        });

        let get = GetMessage {
            block_type,
            options: RouteOptions::NONE,
            desired_replication,
            hop_count: 0,
            bloom_mutator: 0,
            peer_bloom: PeerBloom::new(),
            key,
            xquery,
            get_path: Vec::new(),
        };
        self.handle_get(get).await;
    }

    /// Handle a GET received from a peer, or issued locally via
    /// [`DhtRouter::get_local`] (spec §4.E "GET path").
    pub async fn handle_get(&mut self, get: GetMessage) {
        if !verify_path(&get.get_path) {
            warn!(key = %get.key, "dropping GET with invalid path signature chain");
            return;
        }

        let mut hop_group = validator::create_group(
            get.block_type,
            &get.bloom_mutator.to_be_bytes(),
            GroupOptions {
                seed_set_size: self.config.default_group_size,
                filter_size: None,
            },
        );
        let now = Utc::now();
        let hits: Vec<Block> = self
            .store
            .get(&get.key, get.block_type, now, &NoFilter)
            .into_iter()
            .cloned()
            .collect();

        let mut answered_last = false;
        for block in hits {
            let status = validator::check_reply(get.block_type, &mut hop_group, &get.key, &get.xquery, &block.data);
            match status {
                ReplyStatus::OkLast | ReplyStatus::OkMore => {
                    let result = ResultMessage::from_block(&block, get.get_path.clone());
                    self.route_reply_back(get.get_path.clone(), result).await;
                    if status == ReplyStatus::OkLast {
                        answered_last = true;
                        break;
                    }
                }
                _ => {}
            }
        }

        if answered_last {
            return;
        }

        let r = replication_fan_out(get.desired_replication, get.hop_count);
        let mut peer_bloom = get.peer_bloom.clone();
        peer_bloom.insert(&hash(self.local_pid().as_bytes()));

        let mut get_path = get.get_path.clone();
        get_path.push(append_path_entry(&self.local_keypair, &get.get_path));

        let targets: Vec<(PublicKey, std::sync::Arc<dyn crate::transport::PeerMessageQueue>)> = self
            .neighbours
            .closest_peers(&get.key, r, &peer_bloom)
            .into_iter()
            .map(|e| (e.pid, e.queue.clone()))
            .collect();

        for (pid, queue) in targets {
            let forwarded = GetMessage {
                block_type: get.block_type,
                options: get.options,
                desired_replication: get.desired_replication,
                hop_count: get.hop_count + 1,
                bloom_mutator: get.bloom_mutator,
                peer_bloom: peer_bloom.clone(),
                key: get.key,
                xquery: get.xquery.clone(),
                get_path: get_path.clone(),
            };
            trace!(?pid, key = %get.key, "forwarding GET");
            let _ = queue.send(DhtMessage::Get(forwarded)).await;
        }
    }

    /// Handle a RESULT arriving from a peer: routes it back along its
    /// carried path (spec §4.E "Reply routing").
    pub async fn handle_result(&mut self, result: ResultMessage) {
        let path = result.get_path.clone();
        self.route_reply_back(path, result).await;
    }

    /// Pop the next hop off `path` and forward, or — once the path is
    /// exhausted — deliver to any matching local outstanding GET state.
    /// On a missing or disconnected peer the reply is dropped without
    /// error (spec §4.E "Reply routing").
    async fn route_reply_back(&mut self, mut path: Vec<PathEntry>, mut result: ResultMessage) {
        if !verify_path(&path) {
            warn!(key = %result.key, "dropping reply with broken path signature chain");
            return;
        }
        match path.pop() {
            Some(hop) => {
                if let Some(queue) = self.neighbours.queue_for(&hop.peer) {
                    result.get_path = path;
                    let _ = queue.send(DhtMessage::Result(result)).await;
                } else {
                    trace!(peer = ?hop.peer, "reply hop disconnected, dropping reply");
                }
            }
            None => self.deliver_local(result).await,
        }
    }

    /// Demux a terminal reply to every local outstanding GET matching its
    /// key and type, deduplicating by the GET's own reply group (spec
    /// testable property 6, scenario S4).
    async fn deliver_local(&mut self, result: ResultMessage) {
        let now = Utc::now();
        let Some(list) = self.outstanding_gets.get_mut(&result.key) else {
            return;
        };
        list.retain_mut(|og| {
            if og.deadline <= now {
                return false;
            }
            if og.block_type != result.block_type {
                return true;
            }
            let status = validator::check_reply(og.block_type, &mut og.group, &result.key, &og.xquery, &result.payload);
            match status {
                ReplyStatus::OkLast => {
                    let _ = og.originator.send(result.clone());
                    false
                }
                ReplyStatus::OkMore => {
                    let _ = og.originator.send(result.clone());
                    true
                }
                ReplyStatus::Duplicate => {
                    trace!(key = %result.key, "duplicate reply suppressed");
                    true
                }
                _ => true,
            }
        });
        if list.is_empty() {
            self.outstanding_gets.remove(&result.key);
        }
    }

    /// Reap outstanding GET state past its deadline (spec §4.E
    /// "Timeouts"). The host event loop calls this on a timer tick.
    pub fn reap_expired(&mut self, now: DateTime<Utc>) {
        self.outstanding_gets.retain(|_, list| {
            let before = list.len();
            list.retain(|og| og.deadline > now);
            if list.len() != before {
                trace!("reaped expired outstanding GET state");
            }
            !list.is_empty()
        });
    }

    pub fn outstanding_get_count(&self, key: &HashKey) -> usize {
        self.outstanding_gets.get(key).map_or(0, Vec::len)
    }
}
