//! Test helpers for behavioral specifications.
//!
//! Provides a high-level DSL for driving the `corral` CLI black-box.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

// Aggressive timeouts for fast tests.
//
// IMPORTANT:
//   Do NOT change these.
//   File a performance bug instead.
const CORRAL_TIMEOUT_CONNECT_MS: &str = "2000";
const CORRAL_TIMEOUT_EXIT_MS: &str = "500";
const CORRAL_TIMEOUT_IPC_MS: &str = "500";
const CORRAL_CONNECT_POLL_MS: &str = "5";

// Spec polling timeouts
pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 2000;

/// Returns the path to a binary, checking the llvm-cov target directory
/// first so these tests work under both plain `cargo test` and coverage
/// runs. Falls back to resolving relative to the test binary itself when
/// `CARGO_MANIFEST_DIR` is stale.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

fn corral_binary() -> PathBuf {
    binary_path("corral")
}

/// Returns the path to the corrald daemon binary.
pub fn corrald_binary() -> PathBuf {
    binary_path("corrald")
}

/// Returns a Command configured to run the corral binary.
pub fn corral_cmd() -> Command {
    Command::new(corral_binary())
}

/// Create a CLI builder for corral commands.
pub fn cli() -> CliBuilder {
    CliBuilder::new()
}

/// High-level CLI builder for fluent test assertions.
pub struct CliBuilder {
    args: Vec<String>,
    dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CliBuilder {
    fn new() -> Self {
        Self {
            args: Vec::new(),
            dir: None,
            envs: vec![
                ("CORRAL_DAEMON_BINARY".into(), corrald_binary().to_string_lossy().into()),
                ("CORRAL_TIMEOUT_CONNECT_MS".into(), CORRAL_TIMEOUT_CONNECT_MS.into()),
                ("CORRAL_TIMEOUT_EXIT_MS".into(), CORRAL_TIMEOUT_EXIT_MS.into()),
                ("CORRAL_TIMEOUT_IPC_MS".into(), CORRAL_TIMEOUT_IPC_MS.into()),
                ("CORRAL_CONNECT_POLL_MS".into(), CORRAL_CONNECT_POLL_MS.into()),
            ],
        }
    }

    /// Add CLI arguments.
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set working directory.
    pub fn pwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.dir = Some(path.into());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: &str, value: impl AsRef<Path>) -> Self {
        self.envs.push((key.to_string(), value.as_ref().to_string_lossy().to_string()));
        self
    }

    /// Build the command without running it.
    pub fn command(self) -> Command {
        let mut cmd = corral_cmd();
        cmd.args(&self.args);

        if let Some(dir) = self.dir {
            cmd.current_dir(dir);
        }

        for (key, value) in self.envs {
            cmd.env(key, value);
        }

        cmd
    }

    /// Run and expect success (exit code 0).
    pub fn passes(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            output.status.success(),
            "expected command to pass, got exit code {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Run and expect failure (non-zero exit code).
    pub fn fails(self) -> RunAssert {
        let mut cmd = self.command();
        let output = cmd.output().expect("command should run");
        assert!(
            !output.status.success(),
            "expected command to fail, but it passed\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }
}

/// Result of a CLI run for chaining assertions.
pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn code(&self) -> Option<i32> {
        self.output.status.code()
    }

    pub fn code_is(self, expected: i32) -> Self {
        assert_eq!(self.code(), Some(expected), "unexpected exit code\nstdout: {}\nstderr: {}", self.stdout(), self.stderr());
        self
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(stdout.contains(expected), "stdout does not contain '{expected}'\nstdout: {stdout}");
        self
    }

    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(!stdout.contains(unexpected), "stdout should not contain '{unexpected}'\nstdout: {stdout}");
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(stderr.contains(expected), "stderr does not contain '{expected}'\nstderr: {stderr}");
        self
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Poll a condition until it returns true or timeout is reached.
pub fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);
    let poll_interval = std::time::Duration::from_millis(SPEC_POLL_INTERVAL_MS);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(poll_interval);
    }
    false
}

// =============================================================================
// Corral (isolated state directory per test)
// =============================================================================

/// An isolated `CORRAL_STATE_DIR` with helper methods, scoped to one test.
pub struct Corral {
    state_dir: tempfile::TempDir,
}

impl Corral {
    /// Create a fresh isolated state directory.
    pub fn empty() -> Self {
        Self { state_dir: tempfile::tempdir().unwrap() }
    }

    /// Get the isolated state directory path.
    pub fn state_path(&self) -> &Path {
        self.state_dir.path()
    }

    /// Run a corral command against this state directory.
    pub fn corral(&self) -> CliBuilder {
        cli().env("CORRAL_STATE_DIR", self.state_path())
    }

    /// Read the daemon's own log file (for debugging test failures).
    pub fn daemon_log(&self) -> String {
        let log_path = self.state_path().join("corral.log");
        std::fs::read_to_string(&log_path).unwrap_or_else(|_| "(no daemon log)".to_string())
    }

    /// Read the PID the daemon most recently wrote.
    pub fn daemon_pid(&self) -> Option<u32> {
        let pid_path = self.state_path().join("corral.pid");
        std::fs::read_to_string(&pid_path).ok()?.trim().parse().ok()
    }

    /// True once the daemon has bound its socket.
    pub fn daemon_up(&self) -> bool {
        self.state_path().join("corral.sock").exists()
    }

    /// Kill the daemon process with SIGKILL (simulates a crash).
    pub fn daemon_kill(&self) -> bool {
        let Some(pid) = self.daemon_pid() else { return false };
        Command::new("kill")
            .args(["-9", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Write `patterns.toml` before the daemon's first start; patterns are
    /// loaded once at daemon startup and never hot-reloaded by these tests.
    pub fn write_patterns(&self, toml: &str) {
        std::fs::write(self.state_path().join("patterns.toml"), toml).unwrap();
    }

    /// Start an agent running `command`/`args` under this corral, returning
    /// its name. Fails the test if the create doesn't succeed.
    pub fn spawn(&self, name: &str, command: &[&str]) -> String {
        let mut args = vec!["agent", "create", name];
        args.extend_from_slice(command);
        self.corral().args(&args).passes();
        name.to_string()
    }
}

impl Drop for Corral {
    fn drop(&mut self) {
        let mut cmd = self.corral().args(&["daemon", "stop"]).command();
        cmd.stdout(std::process::Stdio::null()).stderr(std::process::Stdio::null());
        let _ = cmd.status();
    }
}
