// SPDX-License-Identifier: MIT

//! The wire event shape published by a `ProcessWrapper`'s Broadcaster and
//! consumed by subscribers, the CLI, and `ReplayEngine` exports.
//!
//! §6: every event carries `type`, an ISO-8601 timestamp, the agent name,
//! and a `data` payload whose shape depends on `type`. Serializes with
//! `{"type": "...", "timestamp": "...", "agent_name": "...", "data": {...}}`.

use crate::extraction::{CodeBlock, ExtractionEvent};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Connected,
    Log,
    Extraction,
    State,
    CodeBlock,
    ReplayStart,
    ReplayComplete,
    Ping,
}

/// The `data` payload. Each variant's shape is owned by this type; `Event`
/// derives its `type` tag from whichever variant is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Connected {
        session_id: SessionId,
    },
    Log {
        stream: String,
        line_number: u64,
        line: String,
    },
    Extraction(ExtractionEvent),
    State {
        session_id: SessionId,
        state: String,
    },
    CodeBlock(CodeBlock),
    ReplayStart {
        session_id: SessionId,
        speed: f64,
    },
    ReplayComplete {
        session_id: SessionId,
    },
    Ping,
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Connected { .. } => EventType::Connected,
            EventPayload::Log { .. } => EventType::Log,
            EventPayload::Extraction(_) => EventType::Extraction,
            EventPayload::State { .. } => EventType::State,
            EventPayload::CodeBlock(_) => EventType::CodeBlock,
            EventPayload::ReplayStart { .. } => EventType::ReplayStart,
            EventPayload::ReplayComplete { .. } => EventType::ReplayComplete,
            EventPayload::Ping => EventType::Ping,
        }
    }
}

/// A single event on the wire. `timestamp` is RFC 3339 / ISO-8601 UTC
/// (`2024-01-02T03:04:05.678Z`) so downstream consumers (CLI, replay
/// export) never need to reason about epoch milliseconds directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: String,
    pub agent_name: String,
    pub data: EventPayload,
}

impl Event {
    pub fn new(agent_name: impl Into<String>, timestamp_ms: u64, data: EventPayload) -> Self {
        Self {
            event_type: data.event_type(),
            timestamp: format_rfc3339_millis(timestamp_ms),
            agent_name: agent_name.into(),
            data,
        }
    }

    pub fn ping(agent_name: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(agent_name, timestamp_ms, EventPayload::Ping)
    }
}

fn format_rfc3339_millis(epoch_ms: u64) -> String {
    use chrono::{DateTime, Utc};
    let secs = (epoch_ms / 1000) as i64;
    let nanos = ((epoch_ms % 1000) * 1_000_000) as u32;
    let dt = DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
