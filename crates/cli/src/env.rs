// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the CLI crate.

use crate::client::ClientError;
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Resolve state directory: `CORRAL_STATE_DIR` > `dirs::data_dir()/corral`,
/// matching `corral-daemon::config`'s own resolution order.
pub fn state_dir() -> Result<PathBuf, ClientError> {
    if let Ok(dir) = std::env::var("CORRAL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join("corral")).ok_or(ClientError::NoStateDir)
}

pub fn no_color() -> bool {
    std::env::var("NO_COLOR").is_ok_and(|v| v == "1")
}

pub fn force_color() -> bool {
    std::env::var("COLOR").is_ok_and(|v| v == "1")
}

pub fn daemon_binary() -> Option<String> {
    std::env::var("CORRAL_DAEMON_BINARY").ok()
}

pub fn cargo_manifest_dir() -> Option<String> {
    std::env::var("CARGO_MANIFEST_DIR").ok()
}

pub fn timeout_ipc_ms() -> Option<Duration> {
    parse_duration_ms("CORRAL_TIMEOUT_IPC_MS")
}
pub fn timeout_connect_ms() -> Option<Duration> {
    parse_duration_ms("CORRAL_TIMEOUT_CONNECT_MS")
}
pub fn connect_poll_ms() -> Option<Duration> {
    parse_duration_ms("CORRAL_CONNECT_POLL_MS")
}
