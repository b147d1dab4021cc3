// SPDX-License-Identifier: MIT

//! Durable session records and their append-only state-transition log (§4.F).

use crate::error::StoreError;
use corral_core::{AgentState, Session, SessionId, StateChange};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            conn: Mutex::new(crate::schema::open(path.as_ref())?),
        })
    }

    /// Idempotent: a duplicate `session_id` is a no-op, not an error — the
    /// reader fiber may retry a create after a transient write failure.
    pub fn create(
        &self,
        id: &SessionId,
        agent_name: &str,
        environment: &str,
        start_time_ms: u64,
    ) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT OR IGNORE INTO sessions (id, agent_name, environment, start_time_ms, lines_processed, extractions)
             VALUES (?1, ?2, ?3, ?4, 0, 0)",
            params![id.as_str(), agent_name, environment, start_time_ms as i64],
        )?;
        Ok(())
    }

    pub fn record_state(
        &self,
        session_id: &SessionId,
        state: AgentState,
        timestamp_ms: u64,
    ) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO state_changes (session_id, state, timestamp_ms) VALUES (?1, ?2, ?3)",
            params![session_id.as_str(), state.to_string(), timestamp_ms as i64],
        )?;
        Ok(())
    }

    /// One-shot: rejects a second call against an already-closed session,
    /// since a session can only end once.
    pub fn complete(
        &self,
        session_id: &SessionId,
        exit_code: Option<i32>,
        lines_processed: u64,
        timestamp_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let already_closed: Option<i64> = conn
            .query_row(
                "SELECT end_time_ms FROM sessions WHERE id = ?1",
                params![session_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        if already_closed.is_some() {
            return Err(StoreError::AlreadyComplete(session_id.as_str().to_string()));
        }
        let updated = conn.execute(
            "UPDATE sessions SET end_time_ms = ?1, exit_code = ?2, lines_processed = ?3
             WHERE id = ?4 AND end_time_ms IS NULL",
            params![timestamp_ms as i64, exit_code, lines_processed as i64, session_id.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound(session_id.as_str().to_string()));
        }
        Ok(())
    }

    pub fn get(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, agent_name, environment, start_time_ms, end_time_ms, exit_code, lines_processed, extractions
                 FROM sessions WHERE id = ?1",
                params![session_id.as_str()],
                row_to_session,
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// Sessions still open (`end_time_ms IS NULL`), most recently started first.
    pub fn active_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, agent_name, environment, start_time_ms, end_time_ms, exit_code, lines_processed, extractions
             FROM sessions WHERE end_time_ms IS NULL ORDER BY start_time_ms DESC",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn by_agent(&self, agent_name: &str, limit: usize) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, agent_name, environment, start_time_ms, end_time_ms, exit_code, lines_processed, extractions
             FROM sessions WHERE agent_name = ?1 ORDER BY start_time_ms DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![agent_name, limit as i64], row_to_session)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// State-transition log for one session, strictly timestamp-ascending.
    pub fn state_changes(&self, session_id: &SessionId) -> Result<Vec<StateChange>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, state, timestamp_ms FROM state_changes
             WHERE session_id = ?1 ORDER BY timestamp_ms ASC",
        )?;
        let rows = stmt.query_map(params![session_id.as_str()], |row| {
            let session_id: String = row.get(0)?;
            let state: String = row.get(1)?;
            let timestamp_ms: i64 = row.get(2)?;
            Ok(StateChange {
                session_id: SessionId::new(session_id),
                state: parse_agent_state(&state),
                timestamp_ms: timestamp_ms as u64,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let id: String = row.get(0)?;
    let agent_name: String = row.get(1)?;
    let environment: String = row.get(2)?;
    let start_time_ms: i64 = row.get(3)?;
    let end_time_ms: Option<i64> = row.get(4)?;
    let exit_code: Option<i32> = row.get(5)?;
    let lines_processed: i64 = row.get(6)?;
    let extractions: i64 = row.get(7)?;
    Ok(Session {
        id: SessionId::new(id),
        agent_name,
        environment,
        start_time_ms: start_time_ms as u64,
        end_time_ms: end_time_ms.map(|v| v as u64),
        exit_code,
        lines_processed: lines_processed as u64,
        extractions: extractions as u64,
    })
}

fn parse_agent_state(s: &str) -> AgentState {
    match s {
        "starting" => AgentState::Starting,
        "running" => AgentState::Running,
        "paused" => AgentState::Paused,
        "completed" => AgentState::Completed,
        "failed" => AgentState::Failed,
        "killed" => AgentState::Killed,
        _ => AgentState::Created,
    }
}

#[cfg(test)]
#[path = "session_store_tests.rs"]
mod tests;
