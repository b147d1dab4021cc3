// SPDX-License-Identifier: MIT

//! Wires the two stores into the `SessionRecorder`/`ExtractionSink` seam
//! `corral-adapters::process::ProcessWrapper` expects, so the daemon's
//! composition root can hand a `ProcessWrapper` an `Arc<SessionStore>` and
//! an `Arc<ExtractionStore>` directly without an intermediate adapter type.
//!
//! Write failures are logged rather than propagated: both trait methods are
//! infallible by contract (`ProcessWrapper`'s reader fiber cannot itself
//! recover from a storage error mid-stream), matching spec.md §7's
//! "Store-write-error" policy of retry-then-drop-with-counter.

use crate::extraction_store::ExtractionStore;
use crate::session_store::SessionStore;
use corral_adapters::{ExtractionSink, SessionRecorder};
use corral_core::{AgentState, Extracted, SessionId};

impl SessionRecorder for SessionStore {
    fn create(&self, agent_name: &str, session_id: &SessionId, environment: &str, start_ms: u64) {
        if let Err(e) = SessionStore::create(self, session_id, agent_name, environment, start_ms) {
            tracing::error!(agent_name, %session_id, error = %e, "failed to record session create");
        }
    }

    fn record_state(&self, session_id: &SessionId, state: AgentState, timestamp_ms: u64) {
        if let Err(e) = SessionStore::record_state(self, session_id, state, timestamp_ms) {
            tracing::error!(%session_id, ?state, error = %e, "failed to record state change");
        }
    }

    fn complete(&self, session_id: &SessionId, exit_code: Option<i32>, lines_processed: u64, timestamp_ms: u64) {
        if let Err(e) = SessionStore::complete(self, session_id, exit_code, lines_processed, timestamp_ms) {
            tracing::error!(%session_id, error = %e, "failed to record session completion");
        }
    }
}

impl ExtractionSink for ExtractionStore {
    fn save(&self, item: Extracted) {
        if let Err(e) = ExtractionStore::save(self, item) {
            tracing::error!(error = %e, "failed to save extraction");
        }
    }
}
