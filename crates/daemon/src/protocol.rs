// SPDX-License-Identifier: MIT

//! Request/response protocol exposed over the daemon's Unix domain socket
//! (§6). A thin transport: every variant maps directly onto an operation
//! `corral-adapters`/`corral-storage` already implement, mirroring how
//! `oj-daemon::protocol`'s `Request`/`Response` enums sit on top of the
//! engine rather than re-implementing it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire format: 4-byte big-endian length prefix + JSON payload, identical to
/// the teacher's framing.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timeout")]
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub environment: String,
    pub working_dir: std::path::PathBuf,
    #[serde(default)]
    pub env_vars: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCommand {
    Pause,
    Resume,
    Kill,
    GetState,
    SendInput,
    SendSignal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryExtractionsFilter {
    pub agent_name: Option<String>,
    pub session_id: Option<String>,
    pub pattern_name: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayFormat {
    Stream,
    Json,
    Csv,
    Har,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateAgent(CreateAgentRequest),
    ListAgents,
    GetAgent { name: String, include_matches: bool },
    DeleteAgent { name: String },
    Subscribe { name: String, client_id: String },
    Command { name: String, command: AgentCommand, data: Option<String> },
    QueryExtractions { filter: QueryExtractionsFilter },
    QuerySessions { agent_name: String, active_only: bool },
    Replay { session_id: String, speed: f64, format: ReplayFormat },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub name: String,
    pub state: String,
    pub start_time_ms: u64,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDetail {
    pub name: String,
    pub state: String,
    pub session_id: String,
    pub start_time_ms: u64,
    pub pid: Option<u32>,
    pub lines_processed: u64,
    pub exit_code: Option<i32>,
    pub log_path: String,
    /// Present only when the request's `include_matches` was set.
    pub matches: Option<Vec<corral_core::ExtractionEvent>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    AgentCreated { name: String, session_id: String, start_time_ms: u64 },
    Agents { agents: Vec<AgentSummary> },
    Agent { detail: AgentDetail },
    Extractions { events: Vec<corral_core::ExtractionEvent> },
    Sessions { sessions: Vec<corral_core::Session> },
    CommandResult { state: String },
    Document { content: String },
    Error { kind: String, message: String },
}

impl Response {
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: json.len(), max: MAX_MESSAGE_SIZE });
    }
    Ok(json)
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
