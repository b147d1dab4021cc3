// SPDX-License-Identifier: MIT

//! `corral replay` — re-emit a finished session's events.

use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};

use crate::client::DaemonClient;
use crate::output::{format_event, should_use_color};
use corral_daemon::ReplayFormat as WireFormat;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReplayFormat {
    /// Pace events out in real time, scaled by `--speed`
    Stream,
    Json,
    Csv,
    Har,
}

#[derive(Args)]
pub struct ReplayArgs {
    pub session_id: String,
    #[arg(long, value_enum, default_value = "stream")]
    pub format: ReplayFormat,
    /// Playback speed multiplier for `--format stream` (2.0 = twice as fast)
    #[arg(long, default_value = "1.0")]
    pub speed: f64,
}

pub async fn handle(args: ReplayArgs) -> Result<()> {
    match args.format {
        ReplayFormat::Stream => stream(&args.session_id, args.speed).await,
        ReplayFormat::Json => document(&args.session_id, args.speed, WireFormat::Json).await,
        ReplayFormat::Csv => document(&args.session_id, args.speed, WireFormat::Csv).await,
        ReplayFormat::Har => document(&args.session_id, args.speed, WireFormat::Har).await,
    }
}

async fn document(session_id: &str, speed: f64, format: WireFormat) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{e}"))?;
    let content = client.replay(session_id, speed, format).await.map_err(|e| anyhow!("{e}"))?;
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

async fn stream(session_id: &str, speed: f64) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{e}"))?;
    let mut reader = client.replay_stream(session_id, speed).await.map_err(|e| anyhow!("{e}"))?;
    let colorize = should_use_color();

    loop {
        let bytes = match corral_daemon::protocol::read_message(&mut reader).await {
            Ok(b) => b,
            Err(_) => break,
        };
        let Ok(event) = corral_daemon::protocol::decode::<corral_core::Event>(&bytes) else { continue };
        let is_complete = matches!(event.data, corral_core::EventPayload::ReplayComplete { .. });
        if let Some(line) = format_event(&event, colorize) {
            println!("{line}");
        }
        if is_complete {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;
