use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::peer::types::Peer;

/// Default number of undelivered payloads a streamed peer may accumulate.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("delivery queue is full")]
    Full,
    #[error("delivery queue is closed")]
    Closed,
}

/// Sending half of a streamed peer's delivery queue.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<Vec<u8>>,
}

impl DeliveryQueue {
    /// Pushes a payload without waiting for the stream to drain.
    pub fn push(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Receiving half of a streamed peer's delivery queue, handed to exactly one stream.
#[derive(Debug)]
pub struct DeliveryStream {
    pub peer: Peer,
    pub generation: u64,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl DeliveryStream {
    /// Waits for the next payload. `None` once the peer has been removed from the registry.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

#[derive(Debug)]
struct Member {
    peer: Peer,
    generation: u64,
    queue: Option<DeliveryQueue>,
    pending: Option<mpsc::Receiver<Vec<u8>>>,
}

#[derive(Debug, Default)]
struct Inner {
    members: HashMap<String, Member>,
    next_generation: u64,
}

/// Thread-safe set of known peers.
#[derive(Debug)]
pub struct MembershipRegistry {
    inner: Mutex<Inner>,
    queue_capacity: usize,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .expect("membership registry lock poisoned")
    }

    /// Inserts the peer unless an equal one is already registered.
    ///
    /// Returns `true` when the peer was new. Streamed peers get their delivery queue here.
    pub fn append(&self, peer: Peer) -> bool {
        let mut inner = self.lock();
        let key = peer.key();
        if inner.members.contains_key(&key) {
            return false;
        }

        let (queue, pending) = if peer.is_streamed() {
            let (tx, rx) = mpsc::channel(self.queue_capacity);
            (Some(DeliveryQueue { tx }), Some(rx))
        } else {
            (None, None)
        };

        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.members.insert(
            key,
            Member {
                peer,
                generation,
                queue,
                pending,
            },
        );

        true
    }

    /// Removes the peer with the same identity, closing its delivery queue.
    pub fn delete(&self, peer: &Peer) -> bool {
        self.lock().members.remove(&peer.key()).is_some()
    }

    /// Removes the peer only if it is still the registration identified by `generation`.
    pub fn delete_generation(&self, peer: &Peer, generation: u64) -> bool {
        let mut inner = self.lock();
        let key = peer.key();
        match inner.members.get(&key) {
            Some(member) if member.generation == generation => {
                inner.members.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, peer: &Peer) -> bool {
        self.lock().members.contains_key(&peer.key())
    }

    pub fn count(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Drops every member and its queue.
    pub fn clear(&self) {
        self.lock().members.clear();
    }

    /// Copy of the current peers in registration order.
    pub fn snapshot(&self) -> Vec<Peer> {
        let inner = self.lock();
        let mut members: Vec<&Member> = inner.members.values().collect();
        members.sort_by_key(|m| m.generation);
        members.into_iter().map(|m| m.peer.clone()).collect()
    }

    /// Registered version of `peer`, carrying the kind it joined with.
    pub fn get(&self, peer: &Peer) -> Option<Peer> {
        self.lock()
            .members
            .get(&peer.key())
            .map(|m| m.peer.clone())
    }

    pub fn queue_for(&self, peer: &Peer) -> Option<DeliveryQueue> {
        self.lock()
            .members
            .get(&peer.key())
            .and_then(|m| m.queue.clone())
    }

    /// Hands out the receiving end of a streamed peer's queue. Only the first caller gets it.
    pub fn take_stream(&self, peer: &Peer) -> Option<DeliveryStream> {
        let mut inner = self.lock();
        let member = inner.members.get_mut(&peer.key())?;
        let rx = member.pending.take()?;

        Some(DeliveryStream {
            peer: member.peer.clone(),
            generation: member.generation,
            rx,
        })
    }

    pub fn to_wire_format(&self) -> Result<Vec<u8>, serde_json::Error> {
        encode_peers(&self.snapshot())
    }

    /// Decodes a wire peer list. The result is plain content; no queues are created.
    pub fn from_wire_format(bytes: &[u8]) -> Result<Vec<Peer>, serde_json::Error> {
        decode_peers(bytes)
    }
}

impl Default for MembershipRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn encode_peers(peers: &[Peer]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(peers)
}

pub fn decode_peers(bytes: &[u8]) -> Result<Vec<Peer>, serde_json::Error> {
    serde_json::from_slice(bytes)
}
