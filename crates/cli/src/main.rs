// SPDX-License-Identifier: MIT

//! corral - agent supervision CLI

mod client;
mod color;
mod commands;
mod daemon_process;
mod env;
mod exit_error;
mod output;
mod table;

use output::OutputFormat;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, daemon, query, replay};

#[derive(Parser)]
#[command(name = "corral", version, about = "Supervise long-running agent processes over a pty")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent lifecycle: create, list, show, delete, pause, resume, kill, send, signal, logs, attach
    Agent(agent::AgentArgs),
    /// Daemon management
    Daemon(daemon::DaemonArgs),
    /// Query recorded pattern-match events
    Extractions(query::ExtractionsArgs),
    /// Query recorded sessions for an agent
    Sessions(query::SessionsArgs),
    /// Replay a finished session's events
    Replay(replay::ReplayArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let code = e.downcast_ref::<exit_error::ExitError>().map_or(1, |c| c.code);
        let msg = format_error(&e);
        if !msg.is_empty() {
            eprintln!("Error: {msg}");
        }
        std::process::exit(code);
    }
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, skip the
/// "Caused by" chain to avoid noisy duplicate output (common with thiserror
/// variants that use `#[error("... {0}")]` with `#[from]`).
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();

    let chain_redundant = err.chain().skip(1).all(|cause| top.contains(&cause.to_string()));
    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {i}: {cause}"));
    }
    buf
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.output;

    match cli.command {
        Commands::Agent(args) => agent::handle(args.command, format).await?,
        Commands::Daemon(args) => daemon::handle(args, format).await?,
        Commands::Extractions(args) => query::extractions(args, format).await?,
        Commands::Sessions(args) => query::sessions(args, format).await?,
        Commands::Replay(args) => replay::handle(args).await?,
    }

    Ok(())
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
