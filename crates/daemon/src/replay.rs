// SPDX-License-Identifier: MIT

//! Reconstructs a past session as a timed event sequence (§4.I).
//!
//! Merges `SessionStore`'s state-change ledger with `ExtractionStore`'s
//! per-session timeline into one timestamp-ascending sequence, then either
//! streams it back at a scaled real-time pace (mirroring how the teacher's
//! `event_bus` replays a job's recorded `StepRecord`s to a late-joining
//! listener) or renders it as a deterministic document.

use corral_core::{Event, EventPayload, Session, SessionId};
use corral_storage::{ExtractionStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("session '{0}' not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Store(#[from] corral_storage::StoreError),
}

pub struct ReplayEngine {
    sessions: Arc<SessionStore>,
    extractions: Arc<ExtractionStore>,
}

impl ReplayEngine {
    pub fn new(sessions: Arc<SessionStore>, extractions: Arc<ExtractionStore>) -> Self {
        Self { sessions, extractions }
    }

    fn timeline(&self, session_id: &SessionId) -> Result<(Session, Vec<(u64, Event)>), ReplayError> {
        let session = self
            .sessions
            .get(session_id)?
            .ok_or_else(|| ReplayError::NotFound(session_id.as_str().to_string()))?;

        let mut timeline: Vec<(u64, Event)> = Vec::new();
        for change in self.sessions.state_changes(session_id)? {
            let payload = EventPayload::State {
                session_id: session_id.clone(),
                state: change.state.to_string(),
            };
            timeline.push((
                change.timestamp_ms,
                Event::new(&session.agent_name, change.timestamp_ms, payload),
            ));
        }
        for (timestamp_ms, item) in self.extractions.timeline_for_session(session_id.as_str())? {
            let event = corral_storage::to_event(&session.agent_name, timestamp_ms, &item);
            timeline.push((timestamp_ms, event));
        }
        timeline.sort_by_key(|(ts, _)| *ts);
        Ok((session, timeline))
    }

    /// Stream the session back at `speed`x real time (contract: `speed` in
    /// `(0, 10]`). The returned receiver closes after `replay_complete`, or
    /// early if the caller drops it — the background task detects this at
    /// its next sleep boundary and stops rather than draining the timeline.
    pub fn stream(&self, session_id: SessionId, speed: f64) -> Result<mpsc::Receiver<Event>, ReplayError> {
        let speed = speed.clamp(0.1, 10.0);
        let (session, timeline) = self.timeline(&session_id)?;
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let start_event = Event::new(
                &session.agent_name,
                session.start_time_ms,
                EventPayload::ReplayStart { session_id: session_id.clone(), speed },
            );
            if tx.send(start_event).await.is_err() {
                return;
            }

            let mut prev_ts = session.start_time_ms;
            for (ts, event) in timeline {
                let delta_ms = ts.saturating_sub(prev_ts);
                let sleep_ms = (delta_ms as f64 / speed).round() as u64;
                if sleep_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                }
                prev_ts = ts;
                if tx.send(event).await.is_err() {
                    return;
                }
            }

            let end_ts = session.end_time_ms.unwrap_or(prev_ts);
            let complete_event = Event::new(
                &session.agent_name,
                end_ts,
                EventPayload::ReplayComplete { session_id },
            );
            let _ = tx.send(complete_event).await;
        });

        Ok(rx)
    }

    /// Full session as a single JSON document: session metadata plus the
    /// merged timeline, deterministic given identical stored input.
    pub fn export_json(&self, session_id: &SessionId) -> Result<serde_json::Value, ReplayError> {
        let (session, timeline) = self.timeline(session_id)?;
        let events: Vec<&Event> = timeline.iter().map(|(_, e)| e).collect();
        Ok(serde_json::json!({
            "session": session,
            "events": events,
        }))
    }

    /// Flat CSV of extraction events only (state transitions carry no
    /// tabular-friendly fields): `timestamp_ms,event_type,pattern_name,matched_value`.
    pub fn export_csv(&self, session_id: &SessionId) -> Result<String, ReplayError> {
        let (_session, timeline) = self.timeline(session_id)?;
        let mut out = String::from("timestamp_ms,event_type,pattern_name,matched_value\n");
        for (ts, event) in &timeline {
            if let EventPayload::Extraction(e) = &event.data {
                out.push_str(&format!(
                    "{},{},{},{}\n",
                    ts,
                    event_type_str(event.event_type),
                    csv_escape(&e.pattern_name),
                    csv_escape(&e.matched_value),
                ));
            }
        }
        Ok(out)
    }

    /// An HTTP-Archive-shaped document: each timeline event becomes one
    /// `entries[]` record with a synthetic zero-byte request/response pair,
    /// so existing HAR viewers can render the session as a waterfall.
    pub fn export_har(&self, session_id: &SessionId) -> Result<serde_json::Value, ReplayError> {
        let (session, timeline) = self.timeline(session_id)?;
        let entries: Vec<serde_json::Value> = timeline
            .iter()
            .map(|(ts, event)| {
                serde_json::json!({
                    "startedDateTime": event.timestamp,
                    "time": 0,
                    "request": {
                        "method": "EVENT",
                        "url": format!("corral://{}/{}", session.agent_name, event_type_str(event.event_type)),
                        "httpVersion": "HTTP/1.1",
                        "headers": [],
                        "queryString": [],
                        "headersSize": -1,
                        "bodySize": 0,
                    },
                    "response": {
                        "status": 200,
                        "statusText": "OK",
                        "httpVersion": "HTTP/1.1",
                        "headers": [],
                        "content": { "size": 0, "mimeType": "application/json", "text": serde_json::to_string(&event.data).unwrap_or_default() },
                        "redirectURL": "",
                        "headersSize": -1,
                        "bodySize": 0,
                    },
                    "cache": {},
                    "timings": { "send": 0, "wait": 0, "receive": 0 },
                    "_timestampMs": ts,
                })
            })
            .collect();
        Ok(serde_json::json!({
            "log": {
                "version": "1.2",
                "creator": { "name": "corral", "version": env!("CARGO_PKG_VERSION") },
                "entries": entries,
            }
        }))
    }
}

fn event_type_str(event_type: corral_core::EventType) -> &'static str {
    use corral_core::EventType;
    match event_type {
        EventType::Connected => "connected",
        EventType::Log => "log",
        EventType::Extraction => "extraction",
        EventType::State => "state",
        EventType::CodeBlock => "code_block",
        EventType::ReplayStart => "replay_start",
        EventType::ReplayComplete => "replay_complete",
        EventType::Ping => "ping",
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
