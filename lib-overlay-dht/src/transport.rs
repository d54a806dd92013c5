//! Message-queue abstraction over the (out-of-scope) underlay (spec §6
//! "Router → underlay").
//!
//! Grounded on `lib-storage::dht::transport::DhtTransport`: a trait the
//! router drives without knowing which concrete wire protocol backs it,
//! plus `lib-storage::dht::messaging::DhtMessaging`'s queue/channel shape
//! for the in-process reference implementation used by tests.

use crate::messages::DhtMessage;
use async_trait::async_trait;
use lib_overlay_crypto::PublicKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// Per-peer send queue. Messages enqueued on one `PeerMessageQueue` are
/// delivered to that peer in FIFO order (spec §5 ordering guarantees); no
/// ordering is implied across distinct queues.
#[async_trait]
pub trait PeerMessageQueue: Send + Sync {
    /// Enqueue `message` for delivery. Errors only on a torn-down queue.
    async fn send(&self, message: DhtMessage) -> Result<(), TransportError>;

    /// The peer this queue delivers to.
    fn peer(&self) -> PublicKey;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer message queue is closed")]
    Closed,
}

/// An in-process, channel-backed `PeerMessageQueue` used by tests and as
/// the reference adapter concrete underlays plug the same way into.
pub struct LocalQueue {
    peer: PublicKey,
    sender: mpsc::Sender<DhtMessage>,
}

impl LocalQueue {
    pub fn peer(&self) -> PublicKey {
        self.peer
    }
}

#[async_trait]
impl PeerMessageQueue for LocalQueue {
    async fn send(&self, message: DhtMessage) -> Result<(), TransportError> {
        self.sender.send(message).await.map_err(|_| TransportError::Closed)
    }

    fn peer(&self) -> PublicKey {
        self.peer
    }
}

/// The receiving half of a [`LocalQueue`], handed to whatever simulates
/// that peer's event loop in tests.
pub struct LocalInbox {
    pub peer: PublicKey,
    pub receiver: mpsc::Receiver<DhtMessage>,
}

/// A small in-memory underlay: a directory of connected peers' queues, used
/// by integration tests to wire several router instances together without
/// a real network.
#[derive(Default)]
pub struct LocalTransport {
    queues: Mutex<HashMap<[u8; 32], Arc<LocalQueue>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        LocalTransport::default()
    }

    /// Register `peer` and return its queue plus the inbox to drain it from.
    pub async fn register(&self, peer: PublicKey) -> (Arc<LocalQueue>, LocalInbox) {
        let (tx, rx) = mpsc::channel(128);
        let queue = Arc::new(LocalQueue { peer, sender: tx });
        self.queues.lock().await.insert(*peer.as_bytes(), queue.clone());
        trace!(?peer, "registered peer in local transport");
        (queue, LocalInbox { peer, receiver: rx })
    }

    pub async fn queue_for(&self, peer: &PublicKey) -> Option<Arc<LocalQueue>> {
        self.queues.lock().await.get(peer.as_bytes()).cloned()
    }

    pub async fn unregister(&self, peer: &PublicKey) {
        self.queues.lock().await.remove(peer.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DhtMessage;
    use lib_overlay_crypto::KeyPair;

    #[tokio::test]
    async fn messages_arrive_in_fifo_order() {
        // Testable property 9: MQ FIFO.
        let transport = LocalTransport::new();
        let peer = *KeyPair::generate().public();
        let (queue, mut inbox) = transport.register(peer).await;

        for i in 0..5u32 {
            queue.send(DhtMessage::test_marker(i)).await.unwrap();
        }

        for expected in 0..5u32 {
            let msg = inbox.receiver.recv().await.unwrap();
            assert_eq!(msg.test_marker_value(), Some(expected));
        }
    }

    #[tokio::test]
    async fn send_after_inbox_drop_fails_gracefully() {
        let transport = LocalTransport::new();
        let peer = *KeyPair::generate().public();
        let (queue, inbox) = transport.register(peer).await;
        drop(inbox);
        assert!(queue.send(DhtMessage::test_marker(0)).await.is_err());
    }
}
