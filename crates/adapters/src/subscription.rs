// SPDX-License-Identifier: MIT

//! Multiplexes Broadcasters to network clients (§4.H).
//!
//! The manager holds a logical `(agent_name, listener_id)` key per
//! subscription rather than a strong reference into the Broadcaster —
//! resolving the observer-registration cyclic-reference risk the same way
//! the spec's redesign note prescribes. Each registered subscription owns
//! its own `BroadcastListener`; the manager's only shared state is the
//! `corral_core::Subscription` bookkeeping record.

use crate::broadcaster::{Broadcaster, ListenError};
use corral_core::{Clock, Event, Subscription, SubscriptionId, SubscriptionState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct Registration {
    record: Subscription,
}

/// Shared across all of one node's `ProcessWrapper`s; guarded by a short
/// critical section per the spec's concurrency model (§5).
pub struct SubscriptionManager<C: Clock> {
    clock: C,
    registrations: Mutex<HashMap<SubscriptionId, Registration>>,
}

impl<C: Clock> SubscriptionManager<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new subscription against `broadcaster`, returning the
    /// subscription id and a listener the transport layer drains.
    pub fn subscribe(
        &self,
        id: SubscriptionId,
        agent_name: String,
        client_id: String,
        broadcaster: &Broadcaster,
    ) -> (SubscriptionId, crate::broadcaster::BroadcastListener) {
        let now = self.clock.now_ms();
        let record = Subscription::new(id.clone(), agent_name, client_id, now);
        self.registrations.lock().insert(id.clone(), Registration { record });
        (id, broadcaster.subscribe())
    }

    /// Called by the transport loop each time it successfully drains an
    /// event to the wire, reviving a stale subscription.
    pub fn touch(&self, id: &SubscriptionId) {
        let now = self.clock.now_ms();
        if let Some(reg) = self.registrations.lock().get_mut(id) {
            reg.record.touch(now);
        }
    }

    /// Called by the transport loop when `BroadcastListener::recv` reports
    /// a lag — counts the drop without closing unless it becomes sustained.
    pub fn record_lag(&self, id: &SubscriptionId, err: &ListenError) {
        if let ListenError::Lagged(n) = err {
            if let Some(reg) = self.registrations.lock().get_mut(id) {
                for _ in 0..*n {
                    reg.record.record_drop();
                }
            }
        }
    }

    pub fn close(&self, id: &SubscriptionId) {
        if let Some(reg) = self.registrations.lock().get_mut(id) {
            reg.record.close();
        }
    }

    pub fn state(&self, id: &SubscriptionId) -> Option<SubscriptionState> {
        self.registrations.lock().get(id).map(|r| r.record.state)
    }

    /// §4.H periodic liveness: returns the ids still open so the caller can
    /// push a `ping` event on each one's Broadcaster.
    pub fn liveness_sweep(&self) -> Vec<String> {
        self.registrations
            .lock()
            .values()
            .filter(|r| !r.record.state.is_terminal())
            .map(|r| r.record.agent_name.clone())
            .collect()
    }

    /// §4.H stale cleanup: marks and returns subscriptions whose last-drain
    /// exceeds the stale timeout. Sustained staleness (already stale on a
    /// second sweep) closes the subscription.
    pub fn stale_sweep(&self) -> Vec<SubscriptionId> {
        let now = self.clock.now_ms();
        let mut closed = Vec::new();
        let mut registrations = self.registrations.lock();
        for (id, reg) in registrations.iter_mut() {
            if reg.record.state.is_terminal() {
                continue;
            }
            if reg.record.is_stale(now) {
                if reg.record.state == SubscriptionState::Stale {
                    reg.record.close();
                    closed.push(id.clone());
                } else {
                    reg.record.mark_stale();
                }
            }
        }
        closed
    }

    pub fn dropped_events(&self, id: &SubscriptionId) -> Option<u64> {
        self.registrations.lock().get(id).map(|r| r.record.dropped_events)
    }

    pub fn unregister(&self, id: &SubscriptionId) {
        self.registrations.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A keep-alive event emitted on every open subscription's agent stream.
pub fn liveness_event(agent_name: &str, timestamp_ms: u64) -> Event {
    Event::ping(agent_name, timestamp_ms)
}
