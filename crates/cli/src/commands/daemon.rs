// SPDX-License-Identifier: MIT

//! `corral daemon` — start/stop/status for `corrald`, the supervising process.
//!
//! `corral-daemon`'s wire protocol has no `Status`/`Hello`/`Shutdown` request —
//! it only answers questions about the agents it supervises. So unlike a
//! protocol round trip, these commands inspect the daemon from the outside:
//! the PID file, the version file it writes at startup, and the socket itself.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use crate::daemon_process::{
    daemon_dir, daemon_socket, probe_socket, process_exists, read_daemon_pid,
    start_daemon_background, wait_for_exit,
};
use crate::output::{display_log, OutputFormat};

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon in the background if it isn't already running
    Start,
    /// Stop the daemon
    Stop,
    /// Stop then start the daemon
    Restart,
    /// Report whether the daemon is running, its PID and protocol version
    Status,
    /// View the daemon's own log file
    Logs {
        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,
        #[arg(long, short)]
        follow: bool,
    },
}

pub async fn handle(args: DaemonArgs, format: OutputFormat) -> Result<()> {
    match args.command {
        DaemonCommand::Start => start().await,
        DaemonCommand::Stop => stop().await,
        DaemonCommand::Restart => restart().await,
        DaemonCommand::Status => status(format).await,
        DaemonCommand::Logs { limit, follow } => logs(limit, follow, format).await,
    }
}

fn is_running() -> bool {
    match daemon_socket() {
        Ok(path) => path.exists() && probe_socket(&path),
        Err(_) => false,
    }
}

async fn start() -> Result<()> {
    if is_running() {
        println!("daemon already running");
        return Ok(());
    }

    let child = start_daemon_background().map_err(|e| anyhow!("{e}"))?;
    let pid = child.id();
    let deadline = Duration::from_secs(5);
    let mut waited = Duration::ZERO;
    let step = Duration::from_millis(50);
    while waited < deadline {
        if is_running() {
            println!("daemon started (pid {pid})");
            return Ok(());
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    Err(anyhow!("daemon did not start accepting connections within {:?}", deadline))
}

async fn stop() -> Result<()> {
    let Some(pid) = read_daemon_pid().map_err(|e| anyhow!("{e}"))? else {
        println!("daemon not running");
        return Ok(());
    };
    if !process_exists(pid) {
        println!("daemon not running");
        return Ok(());
    }

    crate::daemon_process::stop_daemon_sync();
    if wait_for_exit(pid, Duration::from_secs(5)).await {
        println!("daemon stopped");
        Ok(())
    } else {
        Err(anyhow!("daemon did not exit within timeout"))
    }
}

async fn restart() -> Result<()> {
    stop().await?;
    start().await
}

async fn status(format: OutputFormat) -> Result<()> {
    let running = is_running();
    let pid = read_daemon_pid().ok().flatten();
    let version = read_version_file().ok();

    match format {
        OutputFormat::Text => {
            if running {
                println!("status: running");
                if let Some(pid) = pid {
                    println!("pid: {pid}");
                }
                if let Some(v) = &version {
                    println!("version: {v}");
                }
            } else {
                println!("status: not running");
            }
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "running": running,
                "pid": pid,
                "version": version,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }
    Ok(())
}

async fn logs(limit: usize, follow: bool, format: OutputFormat) -> Result<()> {
    let log_path = daemon_dir().map_err(|e| anyhow!("{e}"))?.join("corral.log");

    if !log_path.exists() {
        match format {
            OutputFormat::Text => println!("no log file found at {}", log_path.display()),
            OutputFormat::Json => {
                let obj = serde_json::json!({ "log_path": log_path.to_string_lossy(), "lines": [] });
                println!("{}", serde_json::to_string_pretty(&obj)?);
            }
        }
        return Ok(());
    }

    let content = read_last_lines(&log_path, limit)?;
    display_log(&log_path, &content, follow, format, "daemon").await
}

fn read_version_file() -> Result<String> {
    let path: PathBuf = daemon_dir().map_err(|e| anyhow!("{e}"))?.join("corral.version");
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

fn read_last_lines(path: &std::path::Path, n: usize) -> Result<String> {
    use std::io::{BufRead, BufReader};
    let file = std::fs::File::open(path)?;
    let lines: Vec<String> = BufReader::new(file).lines().collect::<std::io::Result<_>>()?;
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
