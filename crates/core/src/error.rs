// SPDX-License-Identifier: MIT

//! Shared error taxonomy for pure-logic failures in `corral-core`.
//!
//! I/O and process-lifecycle errors live closer to where they occur
//! (`corral-adapters::ProcessError`, `corral-storage::StoreError`); this
//! enum covers failures that can happen purely from data — pattern
//! compilation and illegal state transitions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("pattern '{name}' failed to compile: {message}")]
    PatternCompile { name: String, message: String },

    #[error("illegal state transition: {0}")]
    IllegalTransition(String),

    #[error("replay target not found: {0}")]
    ReplayNotFound(String),
}
