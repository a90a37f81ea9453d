//! Rank-addressed process-group messaging.
//!
//! This module provides the messaging capability the distributed executor
//! runs on: non-blocking point-to-point send, receive matched by
//! (source, tag) in arrival order, and the two collectives the termination
//! protocol needs (gather-at-root and broadcast-from-root).
//!
//! The broker here routes between tasks of one process over bounded
//! channels, but the endpoint API is transport-shaped: a socket or
//! shared-memory implementation could replace it without touching the
//! worker state machine. Because the in-process transport buffers sends,
//! the "post receives before sends" deadlock-avoidance rule of unbuffered
//! transports is satisfied trivially; workers still follow it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{LifeRingError, Result};

/// Message tag distinguishing payload kinds between the same rank pair.
pub type Tag = u16;

/// Configuration for a process group.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Maximum pending messages per endpoint inbox.
    pub inbox_capacity: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 1024,
        }
    }
}

/// A message in flight between two ranks.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Sender rank.
    pub source: usize,
    /// Message tag.
    pub tag: Tag,
    /// Payload bytes, copied from the sender's buffer at post time.
    pub payload: Vec<u8>,
}

/// Outcome of posting a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Message placed in the destination inbox. Because the payload is
    /// copied at post time, this is also the send-complete event: the
    /// sender's buffer may be reused.
    Delivered,
    /// Destination inbox full.
    QueueFull,
    /// Destination endpoint gone.
    NotFound,
}

/// Statistics for a process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupStats {
    /// Total messages delivered through the broker.
    pub messages_delivered: u64,
}

/// Routes messages between the ranks of one worker group.
///
/// All inboxes are created up front so a send to any valid rank succeeds
/// even before that rank has claimed its endpoint.
pub struct GroupBroker {
    config: GroupConfig,
    senders: Vec<mpsc::Sender<Packet>>,
    inboxes: Mutex<Vec<Option<mpsc::Receiver<Packet>>>>,
    messages_delivered: AtomicU64,
}

impl GroupBroker {
    /// Create a broker for a group of `size` ranks.
    pub fn new(size: usize, config: GroupConfig) -> Arc<Self> {
        let mut senders = Vec::with_capacity(size);
        let mut inboxes = Vec::with_capacity(size);
        for _ in 0..size {
            let (sender, receiver) = mpsc::channel(config.inbox_capacity);
            senders.push(sender);
            inboxes.push(Some(receiver));
        }

        debug!(size, capacity = config.inbox_capacity, "created process group");

        Arc::new(Self {
            config,
            senders,
            inboxes: Mutex::new(inboxes),
            messages_delivered: AtomicU64::new(0),
        })
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> usize {
        self.senders.len()
    }

    /// Claim the endpoint for `rank`. Each rank's endpoint can be claimed
    /// exactly once for the lifetime of the group.
    pub fn endpoint(self: &Arc<Self>, rank: usize) -> Result<GroupEndpoint> {
        if rank >= self.size() {
            return Err(LifeRingError::InvalidConfig(format!(
                "rank {} out of range for group of {}",
                rank,
                self.size()
            )));
        }
        let receiver = self.inboxes.lock()[rank].take().ok_or_else(|| {
            LifeRingError::InvalidConfig(format!("endpoint for rank {rank} already claimed"))
        })?;

        Ok(GroupEndpoint {
            rank,
            receiver,
            stash: VecDeque::new(),
            broker: Arc::clone(self),
        })
    }

    /// Messaging statistics.
    pub fn stats(&self) -> GroupStats {
        GroupStats {
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
        }
    }

    fn post(&self, source: usize, destination: usize, tag: Tag, payload: &[u8]) -> DeliveryStatus {
        let Some(sender) = self.senders.get(destination) else {
            return DeliveryStatus::NotFound;
        };
        let packet = Packet {
            source,
            tag,
            payload: payload.to_vec(),
        };
        match sender.try_send(packet) {
            Ok(()) => {
                self.messages_delivered.fetch_add(1, Ordering::Relaxed);
                DeliveryStatus::Delivered
            }
            Err(mpsc::error::TrySendError::Full(_)) => DeliveryStatus::QueueFull,
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryStatus::NotFound,
        }
    }
}

impl std::fmt::Debug for GroupBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupBroker")
            .field("size", &self.size())
            .field("inbox_capacity", &self.config.inbox_capacity)
            .finish()
    }
}

/// One rank's handle on the process group.
///
/// Receives are matched by (source, tag); packets that arrive out of order
/// are stashed and served to later matching receives in arrival order.
pub struct GroupEndpoint {
    rank: usize,
    receiver: mpsc::Receiver<Packet>,
    stash: VecDeque<Packet>,
    broker: Arc<GroupBroker>,
}

impl GroupEndpoint {
    /// This endpoint's rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> usize {
        self.broker.size()
    }

    /// Post a send to `destination`. The payload is copied at post time,
    /// so on return the caller's buffer may be reused.
    ///
    /// Anything other than delivery is a fatal communication failure: a
    /// partially exchanged ghost column would silently corrupt downstream
    /// cells, so there is no retry.
    pub fn send(&self, destination: usize, tag: Tag, payload: &[u8]) -> Result<()> {
        match self.broker.post(self.rank, destination, tag, payload) {
            DeliveryStatus::Delivered => Ok(()),
            status => Err(LifeRingError::Communication(format!(
                "send from rank {} to rank {} (tag {tag}) failed: {status:?}",
                self.rank, destination
            ))),
        }
    }

    /// Receive the next packet matching (source, tag), in arrival order.
    pub async fn recv(&mut self, source: usize, tag: Tag) -> Result<Packet> {
        let (_, packet) = self.recv_any(&[(source, tag)]).await?;
        Ok(packet)
    }

    /// Receive the first packet matching any of `wants`, in arrival order.
    ///
    /// Returns the index of the matched want alongside the packet, so a
    /// caller waiting on several posted receives can complete them in
    /// whichever order the transport delivers.
    pub async fn recv_any(&mut self, wants: &[(usize, Tag)]) -> Result<(usize, Packet)> {
        let matches = |packet: &Packet| {
            wants
                .iter()
                .position(|&(source, tag)| packet.source == source && packet.tag == tag)
        };

        if let Some(pos) = self.stash.iter().position(|p| matches(p).is_some()) {
            // Stash order is arrival order.
            let packet = self.stash.remove(pos).ok_or_else(|| {
                LifeRingError::InvariantViolation("stash index vanished".to_string())
            })?;
            let want = matches(&packet).ok_or_else(|| {
                LifeRingError::InvariantViolation("stash match vanished".to_string())
            })?;
            return Ok((want, packet));
        }

        loop {
            let packet = self.receiver.recv().await.ok_or_else(|| {
                LifeRingError::Communication(format!(
                    "rank {}: group channel closed while receiving",
                    self.rank
                ))
            })?;
            match matches(&packet) {
                Some(want) => return Ok((want, packet)),
                None => self.stash.push_back(packet),
            }
        }
    }

    /// Gather one byte from every rank into `sink` at `root`.
    ///
    /// At the root, `sink` must hold one slot per rank and is filled by
    /// sender rank; elsewhere `sink` is ignored and the local value is sent.
    pub async fn gather_at(&mut self, root: usize, tag: Tag, value: u8, sink: &mut [u8]) -> Result<()> {
        if self.rank != root {
            return self.send(root, tag, &[value]);
        }

        if sink.len() != self.size() {
            return Err(LifeRingError::InvalidConfig(format!(
                "gather sink holds {} slots for a group of {}",
                sink.len(),
                self.size()
            )));
        }
        sink[root] = value;

        let mut wants: Vec<(usize, Tag)> = (0..self.size()).filter(|&r| r != root).map(|r| (r, tag)).collect();
        while !wants.is_empty() {
            let (want, packet) = self.recv_any(&wants).await?;
            sink[packet.source] = single_byte(&packet)?;
            wants.swap_remove(want);
        }
        Ok(())
    }

    /// Broadcast one byte from `root` to every rank; returns the byte.
    ///
    /// The `value` argument is only meaningful at the root.
    pub async fn broadcast_from(&mut self, root: usize, tag: Tag, value: u8) -> Result<u8> {
        if self.rank == root {
            for destination in (0..self.size()).filter(|&r| r != root) {
                self.send(destination, tag, &[value])?;
            }
            Ok(value)
        } else {
            let packet = self.recv(root, tag).await?;
            single_byte(&packet)
        }
    }
}

impl std::fmt::Debug for GroupEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupEndpoint")
            .field("rank", &self.rank)
            .field("size", &self.size())
            .field("stashed", &self.stash.len())
            .finish()
    }
}

fn single_byte(packet: &Packet) -> Result<u8> {
    if packet.payload.len() != 1 {
        return Err(LifeRingError::Communication(format!(
            "malformed control message from rank {}: {} bytes, expected 1",
            packet.source,
            packet.payload.len()
        )));
    }
    Ok(packet.payload[0])
}
