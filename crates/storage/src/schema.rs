// SPDX-License-Identifier: MIT

//! Schema creation and the shared connection wrapper both stores open against.
//!
//! One `rusqlite` connection per store, guarded by `parking_lot::Mutex` the
//! same way the teacher's `Wal` serializes writers through a single owned
//! `File` handle — queries and writes share one connection rather than
//! pooling, since a single agent daemon's write volume never justifies one.

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;

pub(crate) fn open(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            agent_name TEXT NOT NULL,
            environment TEXT NOT NULL,
            start_time_ms INTEGER NOT NULL,
            end_time_ms INTEGER,
            exit_code INTEGER,
            lines_processed INTEGER NOT NULL DEFAULT 0,
            extractions INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(agent_name);
        CREATE INDEX IF NOT EXISTS idx_sessions_open ON sessions(end_time_ms);

        CREATE TABLE IF NOT EXISTS state_changes (
            rowid INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            state TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_state_changes_session ON state_changes(session_id, timestamp_ms);

        CREATE TABLE IF NOT EXISTS extraction_events (
            rowid INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            agent_name TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            line_number INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            pattern_name TEXT NOT NULL,
            matched_value TEXT NOT NULL,
            original_line TEXT NOT NULL,
            metadata TEXT NOT NULL,
            risk_level TEXT NOT NULL,
            auto_confirmable INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_extractions_session ON extraction_events(session_id, timestamp_ms);
        CREATE INDEX IF NOT EXISTS idx_extractions_agent ON extraction_events(agent_name, timestamp_ms);
        CREATE INDEX IF NOT EXISTS idx_extractions_pattern ON extraction_events(pattern_name);
        CREATE INDEX IF NOT EXISTS idx_extractions_type ON extraction_events(event_type);
        CREATE UNIQUE INDEX IF NOT EXISTS uq_extraction_events_dedup
            ON extraction_events(session_id, pattern_name, line_number, matched_value);

        CREATE TABLE IF NOT EXISTS code_blocks (
            rowid INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            agent_name TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            language TEXT,
            content TEXT NOT NULL,
            line_count INTEGER NOT NULL,
            digest TEXT NOT NULL,
            unclosed INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_code_blocks_session ON code_blocks(session_id, timestamp_ms);
        CREATE INDEX IF NOT EXISTS idx_code_blocks_language ON code_blocks(language);
        CREATE UNIQUE INDEX IF NOT EXISTS uq_code_blocks_dedup ON code_blocks(agent_name, digest);
        ",
    )?;
    Ok(conn)
}
