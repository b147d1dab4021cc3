// SPDX-License-Identifier: MIT

//! `corral agent` and top-level agent lifecycle commands.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};

use crate::client::DaemonClient;
use crate::exit_error::ExitError;
use crate::output::{display_log, format_event, should_use_color, OutputFormat};
use crate::table::{Column, Table};
use corral_daemon::CreateAgentRequest;

#[derive(Args)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentCommand,
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Start a new supervised agent process
    Create {
        /// Name used to address this agent in every later command
        name: String,
        /// Command to run, followed by its arguments
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
        /// Named environment (policy checks applied before spawn)
        #[arg(long, default_value = "dev")]
        environment: String,
        /// Working directory for the spawned process
        #[arg(long, short = 'C')]
        dir: Option<PathBuf>,
        /// Environment variables to pass (repeatable: --env KEY=VALUE)
        #[arg(long = "env", value_parser = parse_key_value)]
        env_vars: Vec<(String, String)>,
    },
    /// List every agent the daemon currently supervises
    List,
    /// Show detail for one agent
    Show {
        name: String,
        /// Include recent pattern matches in the response
        #[arg(long)]
        matches: bool,
    },
    /// Stop and forget an agent
    Delete { name: String },
    /// Pause an agent's pty without killing the process
    Pause { name: String },
    /// Resume a paused agent
    Resume { name: String },
    /// Send SIGTERM (escalating to SIGKILL) and remove the agent
    Kill { name: String },
    /// Write a line of input to an agent's stdin
    Send { name: String, input: String },
    /// Deliver a signal to an agent's process group
    Signal {
        name: String,
        /// Signal name, e.g. SIGTERM, SIGINT, SIGHUP, SIGUSR1, SIGUSR2, SIGKILL
        signal: String,
    },
    /// View an agent's sanitized combined log
    Logs {
        name: String,
        /// Stream new lines as they're written
        #[arg(long, short)]
        follow: bool,
        /// Number of recent lines to show (default: 100)
        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,
    },
    /// Attach to an agent's live event stream
    Attach { name: String },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

pub async fn handle(command: AgentCommand, format: OutputFormat) -> Result<()> {
    match command {
        AgentCommand::Create { name, command, environment, dir, env_vars } => {
            create(name, command, environment, dir, env_vars, format).await
        }
        AgentCommand::List => list(format).await,
        AgentCommand::Show { name, matches } => show(name, matches, format).await,
        AgentCommand::Delete { name } => delete(name).await,
        AgentCommand::Pause { name } => command_simple(name, |c, n| Box::pin(c.pause(n))).await,
        AgentCommand::Resume { name } => command_simple(name, |c, n| Box::pin(c.resume(n))).await,
        AgentCommand::Kill { name } => kill(name).await,
        AgentCommand::Send { name, input } => send(name, input).await,
        AgentCommand::Signal { name, signal } => send_signal(name, signal).await,
        AgentCommand::Logs { name, follow, limit } => logs(name, follow, limit, format).await,
        AgentCommand::Attach { name } => attach(name).await,
    }
}

async fn create(
    name: String,
    mut command: Vec<String>,
    environment: String,
    dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    format: OutputFormat,
) -> Result<()> {
    let client = DaemonClient::for_action().map_err(|e| anyhow!("{e}"))?;
    let binary = command.remove(0);
    let working_dir = match dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };

    let request = CreateAgentRequest {
        name: name.clone(),
        command: binary,
        args: command,
        environment,
        working_dir,
        env_vars: env_vars.into_iter().collect::<HashMap<_, _>>(),
    };

    let (name, session_id, start_time_ms) = client.create_agent(request).await.map_err(|e| anyhow!("{e}"))?;

    match format {
        OutputFormat::Text => println!("created agent '{name}' (session {session_id})"),
        OutputFormat::Json => {
            let obj = serde_json::json!({ "name": name, "session_id": session_id, "start_time_ms": start_time_ms });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }
    Ok(())
}

async fn list(format: OutputFormat) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{e}"))?;
    let agents = client.list_agents().await.map_err(|e| anyhow!("{e}"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&agents)?),
        OutputFormat::Text => {
            if agents.is_empty() {
                println!("no agents running");
                return Ok(());
            }
            let mut table = Table::new(vec![Column::left("NAME"), Column::status("STATE"), Column::right("PID")]);
            for a in &agents {
                table.row(vec![a.name.clone(), a.state.clone(), a.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into())]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}

async fn show(name: String, matches: bool, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{e}"))?;
    let detail = client.get_agent(&name, matches).await.map_err(|e| anyhow!("{e}"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&detail)?),
        OutputFormat::Text => {
            println!("name: {}", detail.name);
            println!("state: {}", if should_use_color() { crate::color::apply_status(&detail.state) } else { detail.state.clone() });
            println!("session: {}", detail.session_id);
            if let Some(pid) = detail.pid {
                println!("pid: {pid}");
            }
            println!("lines processed: {}", detail.lines_processed);
            if let Some(code) = detail.exit_code {
                println!("exit code: {code}");
            }
            println!("log: {}", detail.log_path);
            if let Some(matches) = &detail.matches {
                if matches.is_empty() {
                    println!("matches: none");
                } else {
                    println!("matches:");
                    for m in matches {
                        println!("  {} line={} match={}", m.pattern_name, m.line_number, m.matched_value);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn delete(name: String) -> Result<()> {
    let client = DaemonClient::for_action().map_err(|e| anyhow!("{e}"))?;
    client.delete_agent(&name).await.map_err(|e| anyhow!("{e}"))?;
    println!("deleted agent '{name}'");
    Ok(())
}

async fn command_simple<F>(name: String, call: F) -> Result<()>
where
    F: for<'a> FnOnce(&'a DaemonClient, &'a str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, crate::client::ClientError>> + 'a>>,
{
    let client = DaemonClient::for_action().map_err(|e| anyhow!("{e}"))?;
    let state = call(&client, &name).await.map_err(|e| anyhow!("{e}"))?;
    println!("{name}: {state}");
    Ok(())
}

async fn kill(name: String) -> Result<()> {
    let client = DaemonClient::for_action().map_err(|e| anyhow!("{e}"))?;
    let state = client.kill(&name).await.map_err(|e| anyhow!("{e}"))?;
    client.delete_agent(&name).await.map_err(|e| anyhow!("{e}"))?;
    println!("{name}: {state}, removed");
    Ok(())
}

async fn send(name: String, input: String) -> Result<()> {
    let client = DaemonClient::for_signal().map_err(|e| anyhow!("{e}"))?;
    client.send_input(&name, &format!("{input}\n")).await.map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

async fn send_signal(name: String, signal: String) -> Result<()> {
    let client = DaemonClient::for_signal().map_err(|e| anyhow!("{e}"))?;
    let state = client.send_signal(&name, &signal).await.map_err(|e| anyhow!("{e}"))?;
    println!("{name}: {state}");
    Ok(())
}

async fn logs(name: String, follow: bool, limit: usize, format: OutputFormat) -> Result<()> {
    let log_path = latest_log_path(&name)?
        .ok_or_else(|| ExitError::new(3, format!("no logs found for agent '{name}'")))?;
    let content = read_last_lines(&log_path, limit)?;
    display_log(&log_path, &content, follow, format, &name).await
}

async fn attach(name: String) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{e}"))?;
    let client_id = format!("cli-{}", std::process::id());
    let mut reader = client.subscribe_stream(&name, &client_id).await.map_err(|e| anyhow!("{e}"))?;
    let colorize = should_use_color();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = corral_daemon::protocol::read_message(&mut reader) => {
                let bytes = match result {
                    Ok(b) => b,
                    Err(_) => break,
                };
                let Ok(event) = corral_daemon::protocol::decode::<corral_core::Event>(&bytes) else { continue };
                if let Some(line) = format_event(&event, colorize) {
                    println!("{line}");
                }
            }
            _ = &mut ctrl_c => break,
        }
    }
    Ok(())
}

fn latest_log_path(agent_name: &str) -> Result<Option<PathBuf>> {
    let dir = crate::env::state_dir().map_err(|e| anyhow!("{e}"))?.join("logs").join(agent_name);
    if !dir.exists() {
        return Ok(None);
    }
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let modified = entry.metadata()?.modified()?;
        if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
            latest = Some((modified, entry.path()));
        }
    }
    Ok(latest.map(|(_, p)| p))
}

fn read_last_lines(path: &std::path::Path, n: usize) -> Result<String> {
    use std::io::{BufRead, BufReader};
    let file = std::fs::File::open(path)?;
    let lines: Vec<String> = BufReader::new(file).lines().collect::<std::io::Result<_>>()?;
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
