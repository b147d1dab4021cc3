// SPDX-License-Identifier: MIT

//! `corral extractions` and `corral sessions` read-only queries.

use anyhow::{anyhow, Result};
use clap::Args;

use crate::client::DaemonClient;
use crate::output::OutputFormat;
use crate::table::{Column, Table};
use corral_daemon::QueryExtractionsFilter;

#[derive(Args)]
pub struct ExtractionsArgs {
    /// Restrict to one agent
    #[arg(long)]
    pub agent: Option<String>,
    /// Restrict to one session
    #[arg(long)]
    pub session: Option<String>,
    /// Restrict to one pattern name
    #[arg(long)]
    pub pattern: Option<String>,
    /// Maximum number of events to return
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct SessionsArgs {
    /// Agent to list sessions for
    pub agent: String,
    /// Only show the currently active session, if any
    #[arg(long)]
    pub active_only: bool,
}

pub async fn extractions(args: ExtractionsArgs, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{e}"))?;
    let filter = QueryExtractionsFilter {
        agent_name: args.agent,
        session_id: args.session,
        pattern_name: args.pattern,
        limit: args.limit,
    };
    let events = client.query_extractions(filter).await.map_err(|e| anyhow!("{e}"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
        OutputFormat::Text => {
            if events.is_empty() {
                println!("no extractions found");
                return Ok(());
            }
            let mut table = Table::new(vec![
                Column::left("AGENT"),
                Column::left("PATTERN"),
                Column::status("RISK"),
                Column::right("LINE"),
                Column::left("MATCH").with_max(60),
            ]);
            for e in &events {
                table.row(vec![
                    e.agent_name.clone(),
                    e.pattern_name.clone(),
                    format!("{:?}", e.risk_level).to_lowercase(),
                    e.line_number.to_string(),
                    e.matched_value.clone(),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}

pub async fn sessions(args: SessionsArgs, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{e}"))?;
    let sessions = client.query_sessions(&args.agent, args.active_only).await.map_err(|e| anyhow!("{e}"))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&sessions)?),
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("no sessions found for agent '{}'", args.agent);
                return Ok(());
            }
            let mut table = Table::new(vec![
                Column::left("SESSION"),
                Column::right("START"),
                Column::right("LINES"),
                Column::right("EXTRACTIONS"),
                Column::status("STATUS"),
            ]);
            for s in &sessions {
                let status = if s.end_time_ms.is_some() { "ended" } else { "active" };
                table.row(vec![
                    s.id.short(8).to_string(),
                    crate::output::format_time_ago(s.start_time_ms),
                    s.lines_processed.to_string(),
                    s.extractions.to_string(),
                    status.to_string(),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
