// SPDX-License-Identifier: MIT

//! Session records: one execution of one agent.
//!
//! A session is identified by `<agent_name>-<ISO8601-basic-timestamp>` and is
//! open iff `end_time_ms` is `None`, which holds iff the owning
//! `ProcessWrapper` is alive. `StateChange` is the append-only lifecycle
//! ledger a session accumulates; ordering within a session is strict
//! timestamp-ascending.

use crate::agent::AgentState;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies one execution of one agent: `<agent_name>-<basic-ISO8601>`.
    ///
    /// Distinct from `AgentId`, which names the operator-chosen, long-lived
    /// agent that may accumulate many sessions over time.
    pub struct SessionId;
}

impl SessionId {
    /// Build the canonical `<agent_name>-<basic-ISO8601>` session id from an
    /// agent name and a millisecond epoch timestamp.
    pub fn for_agent_at(agent_name: &str, start_ms: u64) -> Self {
        Self::new(format!("{agent_name}-{}", format_basic_iso8601(start_ms)))
    }
}

/// Format milliseconds-since-epoch as `YYYYMMDDTHHMMSSZ` without pulling in
/// a timezone-aware dependency for what is purely a deterministic id suffix.
fn format_basic_iso8601(epoch_ms: u64) -> String {
    let secs = epoch_ms / 1000;
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);

    // Civil-from-days algorithm (Howard Hinnant), proleptic Gregorian, UTC.
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    format!("{year:04}{month:02}{day:02}T{hour:02}{minute:02}{second:02}Z")
}

/// One execution of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_name: String,
    pub environment: String,
    pub start_time_ms: u64,
    pub end_time_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub lines_processed: u64,
    pub extractions: u64,
}

impl Session {
    pub fn open(id: SessionId, agent_name: String, environment: String, start_time_ms: u64) -> Self {
        Self {
            id,
            agent_name,
            environment,
            start_time_ms,
            end_time_ms: None,
            exit_code: None,
            lines_processed: 0,
            extractions: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time_ms.is_none()
    }
}

/// An append-only lifecycle transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub session_id: SessionId,
    pub state: AgentState,
    pub timestamp_ms: u64,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
