// SPDX-License-Identifier: MIT

//! Many-producer/many-consumer event fan-out for one agent's `ProcessWrapper`
//! (§4.C). Backed by `tokio::sync::broadcast`, which already gives us the
//! policy §4.H needs for a slow client: a bounded ring buffer shared by all
//! receivers, and a `Lagged(n)` notification instead of unboundedly growing
//! memory — we just translate that into the subscription's drop counter.

use corral_core::Event;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy)]
pub struct BroadcasterStats {
    pub capacity: usize,
    pub receiver_count: usize,
}

/// Owned exclusively by one `ProcessWrapper` for the lifetime of one agent.
pub struct Broadcaster {
    tx: broadcast::Sender<Event>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Publish an event to every current subscriber. Non-blocking: if there
    /// are no subscribers this is a no-op (matching the teacher's
    /// non-blocking wake pattern for low-traffic fan-out).
    pub fn publish(&self, event: Event) {
        // A `SendError` only occurs with zero receivers; dropping it is the
        // correct "fire and forget when nobody's listening" behavior.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> BroadcastListener {
        BroadcastListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn stats(&self) -> BroadcasterStats {
        BroadcasterStats {
            capacity: self.capacity,
            receiver_count: self.tx.receiver_count(),
        }
    }
}

/// One subscriber's handle. Wraps `broadcast::Receiver` so callers never see
/// the tokio type directly — keeps the wire-level `SubscriptionManager` free
/// to swap the transport without touching this module.
pub struct BroadcastListener {
    rx: broadcast::Receiver<Event>,
}

#[derive(Debug)]
pub enum ListenError {
    /// The listener fell behind; `n` events were dropped from its view of
    /// the stream. The caller should increment its subscription's drop
    /// counter and keep draining — the stream resumes from the next event.
    Lagged(u64),
    /// The Broadcaster (and its owning wrapper) has closed.
    Closed,
}

impl BroadcastListener {
    pub async fn recv(&mut self) -> Result<Event, ListenError> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(ListenError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(ListenError::Closed),
        }
    }
}
