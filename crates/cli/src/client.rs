// SPDX-License-Identifier: MIT

//! Daemon client used by every CLI command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::daemon_process::{
    cleanup_stale_socket, daemon_dir, daemon_socket, probe_socket, read_startup_error,
    start_daemon_background, stop_daemon_sync, wrap_with_startup_error,
};

use corral_daemon::protocol::{self, ProtocolError};
use corral_daemon::{
    AgentCommand, AgentDetail, AgentSummary, CreateAgentRequest, QueryExtractionsFilter,
    ReplayFormat, Request, Response, PROTOCOL_VERSION,
};
use thiserror::Error;
use tokio::net::UnixStream;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Timeout for request/response round trips.
pub fn timeout_ipc() -> Duration {
    crate::env::timeout_ipc_ms().unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for the daemon to start accepting connections.
pub fn timeout_connect() -> Duration {
    crate::env::timeout_connect_ms().unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for the daemon process to exit during a restart.
pub fn timeout_exit() -> Duration {
    parse_duration_ms("CORRAL_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

/// Polling interval used while waiting on connection/exit retries.
pub fn poll_interval() -> Duration {
    crate::env::connect_poll_ms().unwrap_or(Duration::from_millis(50))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running")]
    DaemonNotRunning,

    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("timed out waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("request rejected: {kind}: {message}")]
    Rejected { kind: String, message: String },

    #[error("unexpected response from daemon")]
    UnexpectedResponse,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine state directory")]
    NoStateDir,
}

/// Thin wrapper around a Unix-socket connection to `corrald`.
///
/// Three constructors encode three different auto-start policies, mirroring
/// how the command that calls them relates to daemon lifecycle:
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// For commands that mutate agent state (`create`, `kill`, ...): connect,
    /// auto-starting the daemon if needed, restarting at most once per
    /// process if the running daemon's version doesn't match this CLI's.
    pub fn for_action() -> Result<Self, ClientError> {
        Self::connect_or_start_once()
    }

    /// For read-only commands (`list`, `logs`, ...): connect only. A version
    /// mismatch on a query isn't worth restarting the daemon over.
    pub fn for_query() -> Result<Self, ClientError> {
        Self::connect()
    }

    /// For commands that send live input to a running agent (`send`): connect
    /// only. Restarting the daemon here would tear down the agent's pty.
    pub fn for_signal() -> Result<Self, ClientError> {
        Self::connect()
    }

    fn connect_or_start_once() -> Result<Self, ClientError> {
        static RESTARTED: AtomicBool = AtomicBool::new(false);

        if RESTARTED.load(Ordering::SeqCst) {
            return Self::connect_or_start();
        }

        let version_path = daemon_dir()?.join("corral.version");
        if let Ok(daemon_version) = std::fs::read_to_string(&version_path) {
            if daemon_version.trim() != PROTOCOL_VERSION {
                RESTARTED.store(true, Ordering::SeqCst);
                eprintln!(
                    "warn: daemon version {} does not match cli version {}, restarting daemon",
                    daemon_version.trim(),
                    PROTOCOL_VERSION
                );
                stop_daemon_sync();
            }
        }

        Self::connect_or_start()
    }

    fn connect_or_start() -> Result<Self, ClientError> {
        match Self::connect() {
            Ok(client) => {
                if probe_socket(&client.socket_path) {
                    Ok(client)
                } else {
                    cleanup_stale_socket()?;
                    let child = start_daemon_background()?;
                    Self::connect_with_retry(timeout_connect(), child)
                }
            }
            Err(ClientError::DaemonNotRunning) => {
                let child = start_daemon_background()?;
                Self::connect_with_retry(timeout_connect(), child)
            }
            Err(e) => Err(wrap_with_startup_error(e)),
        }
    }

    /// Connect to an already-running daemon; no auto-start.
    pub fn connect() -> Result<Self, ClientError> {
        let socket_path = daemon_socket()?;

        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }

        Ok(Self { socket_path })
    }

    fn connect_with_retry(timeout: Duration, mut child: std::process::Child) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let poll_start = Instant::now();
                    while poll_start.elapsed() < timeout_exit() {
                        if let Some(err) = read_startup_error() {
                            return Err(ClientError::DaemonStartFailed(err));
                        }
                        std::thread::sleep(poll_interval());
                    }
                    return Err(ClientError::DaemonStartFailed(format!("exited with {status}")));
                }
                Ok(None) => {}
                Err(_) => {}
            }

            match Self::connect() {
                Ok(client) => return Ok(client),
                Err(ClientError::DaemonNotRunning) => std::thread::sleep(poll_interval()),
                Err(e) => return Err(wrap_with_startup_error(e)),
            }
        }

        Err(wrap_with_startup_error(ClientError::DaemonStartTimeout))
    }

    async fn send_with_timeout(
        &self,
        request: &Request,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes = tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        Ok(protocol::decode(&response_bytes)?)
    }

    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        self.send_with_timeout(request, timeout_ipc(), timeout_ipc()).await
    }

    fn reject<T>(resp: Response) -> Result<T, ClientError> {
        match resp {
            Response::Error { kind, message } => Err(ClientError::Rejected { kind, message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn create_agent(&self, req: CreateAgentRequest) -> Result<(String, String, u64), ClientError> {
        match self.send(&Request::CreateAgent(req)).await? {
            Response::AgentCreated { name, session_id, start_time_ms } => Ok((name, session_id, start_time_ms)),
            other => Self::reject(other),
        }
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, ClientError> {
        match self.send(&Request::ListAgents).await? {
            Response::Agents { agents } => Ok(agents),
            other => Self::reject(other),
        }
    }

    pub async fn get_agent(&self, name: &str, include_matches: bool) -> Result<AgentDetail, ClientError> {
        let request = Request::GetAgent { name: name.to_string(), include_matches };
        match self.send(&request).await? {
            Response::Agent { detail } => Ok(detail),
            other => Self::reject(other),
        }
    }

    pub async fn delete_agent(&self, name: &str) -> Result<(), ClientError> {
        match self.send(&Request::DeleteAgent { name: name.to_string() }).await? {
            Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }

    async fn command(&self, name: &str, command: AgentCommand, data: Option<String>) -> Result<String, ClientError> {
        let request = Request::Command { name: name.to_string(), command, data };
        match self.send(&request).await? {
            Response::CommandResult { state } => Ok(state),
            other => Self::reject(other),
        }
    }

    pub async fn pause(&self, name: &str) -> Result<String, ClientError> {
        self.command(name, AgentCommand::Pause, None).await
    }

    pub async fn resume(&self, name: &str) -> Result<String, ClientError> {
        self.command(name, AgentCommand::Resume, None).await
    }

    pub async fn kill(&self, name: &str) -> Result<String, ClientError> {
        self.command(name, AgentCommand::Kill, None).await
    }

    pub async fn get_state(&self, name: &str) -> Result<String, ClientError> {
        self.command(name, AgentCommand::GetState, None).await
    }

    pub async fn send_input(&self, name: &str, input: &str) -> Result<String, ClientError> {
        self.command(name, AgentCommand::SendInput, Some(input.to_string())).await
    }

    pub async fn send_signal(&self, name: &str, signal: &str) -> Result<String, ClientError> {
        self.command(name, AgentCommand::SendSignal, Some(signal.to_string())).await
    }

    pub async fn query_extractions(&self, filter: QueryExtractionsFilter) -> Result<Vec<corral_core::ExtractionEvent>, ClientError> {
        match self.send(&Request::QueryExtractions { filter }).await? {
            Response::Extractions { events } => Ok(events),
            other => Self::reject(other),
        }
    }

    pub async fn query_sessions(&self, agent_name: &str, active_only: bool) -> Result<Vec<corral_core::Session>, ClientError> {
        let request = Request::QuerySessions { agent_name: agent_name.to_string(), active_only };
        match self.send(&request).await? {
            Response::Sessions { sessions } => Ok(sessions),
            other => Self::reject(other),
        }
    }

    pub async fn replay(&self, session_id: &str, speed: f64, format: ReplayFormat) -> Result<String, ClientError> {
        let request = Request::Replay { session_id: session_id.to_string(), speed, format };
        match self.send(&request).await? {
            Response::Document { content } => Ok(content),
            other => Self::reject(other),
        }
    }

    /// Open a subscription to `name`'s live event stream.
    ///
    /// Unlike the other methods, this returns the raw socket half after the
    /// handshake `Response::Ok` so the caller can loop reading `Event`
    /// messages for as long as `attach` stays open.
    pub async fn subscribe_stream(
        &self,
        name: &str,
        client_id: &str,
    ) -> Result<tokio::net::unix::OwnedReadHalf, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let request = Request::Subscribe { name: name.to_string(), client_id: client_id.to_string() };
        let data = protocol::encode(&request)?;
        protocol::write_message(&mut writer, &data).await?;

        let response_bytes = protocol::read_message(&mut reader).await?;
        match protocol::decode(&response_bytes)? {
            Response::Ok => Ok(reader),
            other => Self::reject(other),
        }
    }

    /// Open a live (speed-paced) replay stream, same handshake as
    /// [`Self::subscribe_stream`].
    pub async fn replay_stream(
        &self,
        session_id: &str,
        speed: f64,
    ) -> Result<tokio::net::unix::OwnedReadHalf, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let request = Request::Replay { session_id: session_id.to_string(), speed, format: ReplayFormat::Stream };
        let data = protocol::encode(&request)?;
        protocol::write_message(&mut writer, &data).await?;

        let response_bytes = protocol::read_message(&mut reader).await?;
        match protocol::decode(&response_bytes)? {
            Response::Ok => Ok(reader),
            other => Self::reject(other),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
