// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session {0} does not exist")]
    SessionNotFound(String),
    #[error("session {0} is already complete")]
    AlreadyComplete(String),
    #[error("write failed after {attempts} attempts: {last_error}")]
    PersistentWriteFailure { attempts: u32, last_error: String },
}
