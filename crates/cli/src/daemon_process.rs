// SPDX-License-Identifier: MIT

//! Daemon process management: starting, stopping, and probing `corrald`.

use crate::client::ClientError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// Start the daemon in the background, returning the child process handle.
pub fn start_daemon_background() -> Result<std::process::Child, ClientError> {
    let corrald_path = find_corrald_binary()?;

    Command::new(&corrald_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Stop the daemon synchronously using SIGTERM then SIGKILL.
///
/// Used during version-mismatch restart, where we're in a sync context
/// inside a tokio runtime and can't `block_on`.
pub fn stop_daemon_sync() {
    if let Ok(Some(pid)) = read_daemon_pid() {
        kill_signal("-15", pid);

        let start = Instant::now();
        let timeout = super::client::timeout_exit();
        while start.elapsed() < timeout {
            if !process_exists(pid) {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        if process_exists(pid) {
            force_kill_daemon(pid);
            let start = Instant::now();
            while start.elapsed() < timeout {
                if !process_exists(pid) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    if let Ok(dir) = daemon_dir() {
        cleanup_stale_pid(&dir);
    }
}

/// Wait for a process to exit.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(super::client::poll_interval()).await;
    }
    false
}

fn find_corrald_binary() -> Result<PathBuf, ClientError> {
    if let Some(path) = crate::env::daemon_binary() {
        return Ok(PathBuf::from(path));
    }

    let current_exe = std::env::current_exe().ok();

    // Only use CARGO_MANIFEST_DIR if the CLI itself is a debug build, so a
    // release CLI invoked from a dev shell doesn't pick up a dev daemon.
    let is_debug_build = current_exe
        .as_ref()
        .and_then(|p| p.to_str())
        .map(|s| s.contains("target/debug"))
        .unwrap_or(false);

    if is_debug_build {
        if let Some(manifest_dir) = crate::env::cargo_manifest_dir() {
            let dev_path = PathBuf::from(manifest_dir)
                .parent()
                .and_then(|p| p.parent())
                .map(|p| p.join("target/debug/corrald"));
            if let Some(path) = dev_path {
                if path.exists() {
                    return Ok(path);
                }
            }
        }
    }

    if let Some(ref exe) = current_exe {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("corrald");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    Ok(PathBuf::from("corrald"))
}

/// Get the socket path for the daemon.
pub fn daemon_socket() -> Result<PathBuf, ClientError> {
    Ok(daemon_dir()?.join("corral.sock"))
}

/// Get the state directory corrald reads and writes under.
pub fn daemon_dir() -> Result<PathBuf, ClientError> {
    crate::env::state_dir()
}

/// Clean up an orphaned PID file during shutdown.
pub fn cleanup_stale_pid(dir: &std::path::Path) {
    let pid_path = dir.join("corral.pid");
    if pid_path.exists() {
        let _ = std::fs::remove_file(&pid_path);
    }
}

/// Read the PID from the daemon's PID file, if it exists.
pub fn read_daemon_pid() -> Result<Option<u32>, ClientError> {
    let pid_path = daemon_dir()?.join("corral.pid");

    if !pid_path.exists() {
        return Ok(None);
    }

    match std::fs::read_to_string(&pid_path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(_) => Ok(None),
    }
}

fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", pid)
}

pub fn force_kill_daemon(pid: u32) -> bool {
    kill_signal("-9", pid)
}

const STARTUP_MARKER: &str = "starting corral daemon";

/// Scrape the daemon log for an error logged during the most recent startup.
pub fn read_startup_error() -> Option<String> {
    let log_path = daemon_dir().ok()?.join("corral.log");
    let content = std::fs::read_to_string(&log_path).ok()?;
    parse_startup_error(&content)
}

fn parse_startup_error(content: &str) -> Option<String> {
    let start_pos = content.rfind(STARTUP_MARKER)?;
    let startup_log = &content[start_pos..];

    let errors: Vec<&str> = startup_log
        .lines()
        .filter(|line| line.contains("ERROR") || line.contains("Failed to start"))
        .collect();

    if errors.is_empty() {
        return None;
    }

    let error_messages: Vec<String> = errors
        .iter()
        .filter_map(|line| line.split_once(": ").map(|(_, msg)| msg.to_string()))
        .collect();

    if error_messages.is_empty() {
        Some(errors.join("\n"))
    } else {
        Some(error_messages.join("\n"))
    }
}

/// Wrap an error with startup log info if available.
pub fn wrap_with_startup_error(err: ClientError) -> ClientError {
    if matches!(err, ClientError::DaemonStartFailed(_)) {
        return err;
    }

    match read_startup_error() {
        Some(startup_error) => ClientError::DaemonStartFailed(startup_error),
        None => err,
    }
}

/// Probe whether a Unix socket is accepting connections.
pub fn probe_socket(socket_path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

/// Remove a stale socket/PID pair left behind by a daemon that is no longer
/// running, so a fresh daemon can bind the socket path.
pub fn cleanup_stale_socket() -> Result<(), ClientError> {
    let dir = daemon_dir()?;
    let socket_path = dir.join("corral.sock");
    let pid_path = dir.join("corral.pid");

    let pid_is_dead = match read_daemon_pid() {
        Ok(Some(pid)) => !process_exists(pid),
        Ok(None) => true,
        Err(_) => true,
    };

    if pid_is_dead {
        let _ = std::fs::remove_file(&socket_path);
        let _ = std::fs::remove_file(&pid_path);
    }

    Ok(())
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;
