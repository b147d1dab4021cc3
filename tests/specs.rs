//! Behavioral specifications for the `corral` CLI and `corrald` daemon.
//!
//! These tests are black-box: they invoke the CLI binary and verify
//! stdout, stderr, and exit codes, auto-starting an isolated `corrald`
//! under a per-test `CORRAL_STATE_DIR`.

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/cli/errors.rs"]
mod cli_errors;

#[path = "specs/daemon/lifecycle.rs"]
mod daemon_lifecycle;
#[path = "specs/daemon/logs.rs"]
mod daemon_logs;

#[path = "specs/agent/lifecycle.rs"]
mod agent_lifecycle;
#[path = "specs/agent/control.rs"]
mod agent_control;
#[path = "specs/agent/logs.rs"]
mod agent_logs;

#[path = "specs/query/extractions.rs"]
mod query_extractions;
#[path = "specs/query/sessions.rs"]
mod query_sessions;

#[path = "specs/replay/pacing.rs"]
mod replay_pacing;
#[path = "specs/replay/formats.rs"]
mod replay_formats;
