// SPDX-License-Identifier: MIT

//! Unix-domain-socket accept loop (§6). Each connection gets its own spawned
//! task, mirroring the teacher's `Listener::run`/`handle_connection` split —
//! the accept loop never blocks on a single client, and a slow or hung
//! client can only stall its own task.

use crate::config::Config;
use crate::protocol::{self, AgentCommand, Request, Response, ReplayFormat, DEFAULT_TIMEOUT};
use crate::registry::AgentRegistry;
use crate::replay::ReplayEngine;
use corral_adapters::{Broadcaster, SubscriptionManager};
use corral_core::{SessionId, SubscriptionId, SystemClock};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, warn};

/// Consecutive `Lagged` notifications a subscription tolerates before the
/// listener gives up on it — the wire-level half of the slow-subscriber
/// eviction the Broadcaster's bounded mailbox makes possible (§4.C/§4.H).
const MAX_CONSECUTIVE_LAG: u32 = 3;

pub struct ListenCtx {
    pub registry: Arc<AgentRegistry>,
    pub replay: Arc<ReplayEngine>,
    pub sessions: Arc<corral_storage::SessionStore>,
    pub extractions: Arc<corral_storage::ExtractionStore>,
    pub subscriptions: Arc<SubscriptionManager<SystemClock>>,
}

pub struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn bind(config: &Config, ctx: Arc<ListenCtx>) -> std::io::Result<Self> {
        let _ = std::fs::remove_file(&config.socket_path);
        let socket = UnixListener::bind(&config.socket_path)?;
        Ok(Self { socket, ctx })
    }

    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                protocol::ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                protocol::ProtocolError::Timeout => warn!("connection timeout"),
                                other => error!(error = %other, "connection error"),
                            }
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), protocol::ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;
    debug!(request = ?request, "received request");

    match request {
        Request::Subscribe { name, client_id } => {
            stream_subscription(&mut writer, ctx, name, client_id).await
        }
        Request::Replay { session_id, speed, format } if matches!(format, ReplayFormat::Stream) => {
            stream_replay(&mut writer, ctx, session_id, speed).await
        }
        other => {
            let response = handle_request(other, ctx).await;
            protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await
        }
    }
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::CreateAgent(req) => match ctx.registry.create(req) {
            Ok(wrapper) => {
                let snapshot = wrapper.snapshot().await;
                Response::AgentCreated {
                    name: wrapper.agent_id().await.as_str().to_string(),
                    session_id: wrapper.session_id().as_str().to_string(),
                    start_time_ms: snapshot.spawn_time_ms,
                }
            }
            Err(e) => Response::error("create_failed", e.to_string()),
        },

        Request::ListAgents => {
            let mut agents = Vec::new();
            for name in ctx.registry.names() {
                if let Some(wrapper) = ctx.registry.get(&name) {
                    let snapshot = wrapper.snapshot().await;
                    agents.push(crate::protocol::AgentSummary {
                        name: name.clone(),
                        state: snapshot.state.to_string(),
                        start_time_ms: snapshot.spawn_time_ms,
                        pid: snapshot.pid,
                    });
                }
            }
            Response::Agents { agents }
        }

        Request::GetAgent { name, include_matches } => match ctx.registry.get(&name) {
            Some(wrapper) => {
                let snapshot = wrapper.snapshot().await;
                let matches = if include_matches {
                    Some(ctx.extractions.by_agent(&name, 20).unwrap_or_default())
                } else {
                    None
                };
                Response::Agent {
                    detail: crate::protocol::AgentDetail {
                        name,
                        state: snapshot.state.to_string(),
                        session_id: wrapper.session_id().as_str().to_string(),
                        start_time_ms: snapshot.spawn_time_ms,
                        pid: snapshot.pid,
                        lines_processed: wrapper.lines_processed(),
                        exit_code: snapshot.exit_code,
                        log_path: wrapper.log_path().await.display().to_string(),
                        matches,
                    },
                }
            }
            None => Response::error("not_found", format!("agent '{name}' not found")),
        },

        Request::DeleteAgent { name } => match ctx.registry.get(&name) {
            Some(wrapper) => {
                let _ = wrapper.stop().await;
                match ctx.registry.remove(&name) {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::error("delete_failed", e.to_string()),
                }
            }
            None => Response::error("not_found", format!("agent '{name}' not found")),
        },

        Request::Command { name, command, data } => match ctx.registry.get(&name) {
            Some(wrapper) => dispatch_command(&wrapper, command, data).await,
            None => Response::error("not_found", format!("agent '{name}' not found")),
        },

        Request::QueryExtractions { filter } => {
            let events = query_extractions(ctx, &filter).unwrap_or_default();
            Response::Extractions { events }
        }

        Request::QuerySessions { agent_name, active_only } => {
            let sessions = if active_only {
                ctx.sessions.active_sessions().unwrap_or_default()
            } else {
                ctx.sessions.by_agent(&agent_name, 100).unwrap_or_default()
            };
            Response::Sessions { sessions }
        }

        Request::Replay { session_id, format, .. } => match export_document(ctx, &session_id, format) {
            Ok(response) => response,
            Err(e) => Response::error("replay_failed", e.to_string()),
        },

        Request::Subscribe { .. } => unreachable!("handled by stream_subscription"),
    }
}

async fn dispatch_command(
    wrapper: &corral_adapters::ProcessWrapper<corral_core::SystemClock>,
    command: AgentCommand,
    data: Option<String>,
) -> Response {
    let result = match command {
        AgentCommand::Pause => wrapper.pause().await,
        AgentCommand::Resume => wrapper.resume().await,
        AgentCommand::Kill => wrapper.stop().await,
        AgentCommand::GetState => Ok(()),
        AgentCommand::SendInput => match data {
            Some(input) => wrapper.send_input(input.as_bytes()).await,
            None => return Response::error("bad_request", "send_input requires data"),
        },
        AgentCommand::SendSignal => match data.as_deref().and_then(parse_signal) {
            Some(sig) => wrapper.send_signal(sig).await,
            None => return Response::error("bad_request", "send_signal requires a known signal name"),
        },
    };
    match result {
        Ok(()) => Response::CommandResult { state: wrapper.state().await.to_string() },
        Err(e) => Response::error("command_failed", e.to_string()),
    }
}

fn parse_signal(name: &str) -> Option<nix::sys::signal::Signal> {
    use nix::sys::signal::Signal;
    match name {
        "SIGTERM" => Some(Signal::SIGTERM),
        "SIGKILL" => Some(Signal::SIGKILL),
        "SIGINT" => Some(Signal::SIGINT),
        "SIGHUP" => Some(Signal::SIGHUP),
        "SIGUSR1" => Some(Signal::SIGUSR1),
        "SIGUSR2" => Some(Signal::SIGUSR2),
        _ => None,
    }
}

fn query_extractions(
    ctx: &ListenCtx,
    filter: &crate::protocol::QueryExtractionsFilter,
) -> Result<Vec<corral_core::ExtractionEvent>, corral_storage::StoreError> {
    let limit = filter.limit.unwrap_or(100);
    if let Some(session_id) = &filter.session_id {
        return ctx.extractions.by_session(session_id, limit);
    }
    if let Some(pattern_name) = &filter.pattern_name {
        return ctx.extractions.by_pattern(pattern_name, limit);
    }
    if let Some(agent_name) = &filter.agent_name {
        return ctx.extractions.by_agent(agent_name, limit);
    }
    Ok(Vec::new())
}

fn export_document(
    ctx: &ListenCtx,
    session_id: &str,
    format: ReplayFormat,
) -> Result<Response, crate::replay::ReplayError> {
    let session_id = SessionId::new(session_id);
    let content = match format {
        ReplayFormat::Json => ctx.replay.export_json(&session_id)?.to_string(),
        ReplayFormat::Csv => ctx.replay.export_csv(&session_id)?,
        ReplayFormat::Har => ctx.replay.export_har(&session_id)?.to_string(),
        ReplayFormat::Stream => unreachable!("handled by stream_replay"),
    };
    Ok(Response::Document { content })
}

async fn stream_subscription(
    writer: &mut (impl tokio::io::AsyncWriteExt + Unpin),
    ctx: &ListenCtx,
    name: String,
    client_id: String,
) -> Result<(), protocol::ProtocolError> {
    let Some(wrapper) = ctx.registry.get(&name) else {
        return protocol::write_response(writer, &Response::error("not_found", format!("agent '{name}' not found")), DEFAULT_TIMEOUT).await;
    };
    protocol::write_response(writer, &Response::Ok, DEFAULT_TIMEOUT).await?;

    let broadcaster: Arc<Broadcaster> = wrapper.broadcaster();
    let id = SubscriptionId::new(format!("{name}-{client_id}"));
    let (id, mut listener) = ctx.subscriptions.subscribe(id, name, client_id, &broadcaster);

    let mut consecutive_lag = 0u32;
    let result = loop {
        match listener.recv().await {
            Ok(event) => {
                consecutive_lag = 0;
                ctx.subscriptions.touch(&id);
                let bytes = protocol::encode(&event)?;
                protocol::write_message(writer, &bytes).await?;
            }
            Err(err @ corral_adapters::ListenError::Lagged(_)) => {
                ctx.subscriptions.record_lag(&id, &err);
                consecutive_lag += 1;
                if consecutive_lag >= MAX_CONSECUTIVE_LAG {
                    warn!(subscription = %id, "evicting subscription after sustained lag");
                    break Ok(());
                }
                continue;
            }
            Err(corral_adapters::ListenError::Closed) => break Ok(()),
        }
    };
    ctx.subscriptions.close(&id);
    ctx.subscriptions.unregister(&id);
    result
}

async fn stream_replay(
    writer: &mut (impl tokio::io::AsyncWriteExt + Unpin),
    ctx: &ListenCtx,
    session_id: String,
    speed: f64,
) -> Result<(), protocol::ProtocolError> {
    let session_id = SessionId::new(session_id);
    let mut rx = match ctx.replay.stream(session_id, speed) {
        Ok(rx) => rx,
        Err(e) => {
            return protocol::write_response(writer, &Response::error("not_found", e.to_string()), DEFAULT_TIMEOUT).await;
        }
    };
    protocol::write_response(writer, &Response::Ok, DEFAULT_TIMEOUT).await?;

    while let Some(event) = rx.recv().await {
        let bytes = protocol::encode(&event)?;
        protocol::write_message(writer, &bytes).await?;
    }
    Ok(())
}
