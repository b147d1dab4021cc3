// SPDX-License-Identifier: MIT

//! A live consumer's handle on one agent's broadcast stream (§3, §4.H).
//!
//! This module holds only the data/state-machine shape; the mailbox itself
//! (a bounded channel with drop-oldest backpressure) lives in
//! `corral-adapters::subscription` alongside the `SubscriptionManager` that
//! owns the registration.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies one subscriber's registration against one agent's
    /// Broadcaster.
    pub struct SubscriptionId;
}

/// `connected → active → (stale|closed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Connected,
    Active,
    Stale,
    Closed,
}

impl SubscriptionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionState::Closed)
    }

    pub fn can_transition_to(&self, next: SubscriptionState) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, next),
            (Connected, Active)
                | (Connected, Closed)
                | (Active, Stale)
                | (Active, Closed)
                | (Stale, Active)
                | (Stale, Closed)
        )
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionState::Connected => "connected",
            SubscriptionState::Active => "active",
            SubscriptionState::Stale => "stale",
            SubscriptionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One client's subscription to one agent's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub agent_name: String,
    pub client_id: String,
    pub state: SubscriptionState,
    pub last_activity_ms: u64,
    /// Mailbox capacity; default per §4.H is 100.
    pub mailbox_capacity: usize,
    pub dropped_events: u64,
}

impl Subscription {
    pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;
    pub const STALE_TIMEOUT_MS: u64 = 120_000;
    pub const LIVENESS_INTERVAL_MS: u64 = 15_000;
    pub const STALE_SWEEP_INTERVAL_MS: u64 = 30_000;

    pub fn new(id: SubscriptionId, agent_name: String, client_id: String, now_ms: u64) -> Self {
        Self {
            id,
            agent_name,
            client_id,
            state: SubscriptionState::Connected,
            last_activity_ms: now_ms,
            mailbox_capacity: Self::DEFAULT_MAILBOX_CAPACITY,
            dropped_events: 0,
        }
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
        if self.state == SubscriptionState::Connected {
            self.state = SubscriptionState::Active;
        } else if self.state == SubscriptionState::Stale {
            self.state = SubscriptionState::Active;
        }
    }

    pub fn is_stale(&self, now_ms: u64) -> bool {
        !self.state.is_terminal() && now_ms.saturating_sub(self.last_activity_ms) >= Self::STALE_TIMEOUT_MS
    }

    pub fn mark_stale(&mut self) {
        if self.state.can_transition_to(SubscriptionState::Stale) {
            self.state = SubscriptionState::Stale;
        }
    }

    pub fn close(&mut self) {
        self.state = SubscriptionState::Closed;
    }

    pub fn record_drop(&mut self) {
        self.dropped_events += 1;
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
