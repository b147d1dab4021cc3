// SPDX-License-Identifier: MIT

//! corrald: the background process that supervises agent pty sessions.
//!
//! Architecture: a `Listener` task accepts Unix-socket connections and
//! dispatches each request against an `AgentRegistry` directly — there is no
//! separate engine loop here, since unlike the teacher's job pipeline there
//! is no durable event log to replay sequentially. The main task's loop only
//! waits on the subscription-liveness/stale sweeps and shutdown signals.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod listener;
mod protocol;
mod registry;
mod replay;

use config::Config;
use corral_adapters::SubscriptionManager;
use corral_core::{Clock, SystemClock};
use listener::{ListenCtx, Listener};
use registry::AgentRegistry;
use replay::ReplayEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const LIVENESS_SWEEP_INTERVAL: Duration = Duration::from_millis(15_000);
const STALE_SWEEP_INTERVAL: Duration = Duration::from_millis(30_000);
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ROTATED_LOGS: u32 = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("corrald {}", protocol::PROTOCOL_VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("corrald {}", protocol::PROTOCOL_VERSION);
                println!("Agent supervision daemon. Listens on a Unix socket for commands from `corral`.");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("usage: corrald [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    rotate_log_if_needed(&config.log_path);
    let _log_guard = setup_logging(&config)?;

    info!("starting corral daemon");

    std::fs::write(config.state_dir.join("corral.pid"), std::process::id().to_string())?;
    std::fs::write(config.state_dir.join("corral.version"), protocol::PROTOCOL_VERSION)?;

    std::fs::create_dir_all(&config.logs_dir)?;
    let sessions = Arc::new(corral_storage::SessionStore::open(&config.sessions_db_path)?);
    let extractions = Arc::new(corral_storage::ExtractionStore::open(&config.extractions_db_path)?);
    let patterns = config::load_patterns(&config.patterns_path)?;

    let registry = Arc::new(AgentRegistry::new(
        config.environments_path.clone(),
        patterns,
        config.logs_dir.clone(),
        Arc::clone(&sessions) as Arc<dyn corral_adapters::SessionRecorder>,
        Arc::clone(&extractions) as Arc<dyn corral_adapters::ExtractionSink>,
    ));
    let replay = Arc::new(ReplayEngine::new(Arc::clone(&sessions), Arc::clone(&extractions)));
    let subscriptions = Arc::new(SubscriptionManager::new(SystemClock));

    let ctx = Arc::new(ListenCtx {
        registry: Arc::clone(&registry),
        replay,
        sessions: Arc::clone(&sessions),
        extractions: Arc::clone(&extractions),
        subscriptions: Arc::clone(&subscriptions),
    });

    let listener = Listener::bind(&config, ctx)?;
    tokio::spawn(listener.run());

    spawn_subscription_sweeps(Arc::clone(&subscriptions), Arc::clone(&registry));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "daemon ready");
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    for name in registry.names() {
        if let Some(wrapper) = registry.get(&name) {
            if let Err(e) = wrapper.stop().await {
                error!(agent = %name, error = %e, "failed to stop agent during shutdown");
            }
        }
    }

    let _ = std::fs::remove_file(config.state_dir.join("corral.pid"));
    let _ = std::fs::remove_file(config.state_dir.join("corral.version"));

    info!("daemon stopped");
    Ok(())
}

/// Spawn the two §4.H background sweeps over the subscription table.
fn spawn_subscription_sweeps(subscriptions: Arc<SubscriptionManager<SystemClock>>, registry: Arc<AgentRegistry>) {
    let liveness = Arc::clone(&subscriptions);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIVENESS_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            for name in liveness.liveness_sweep() {
                if let Some(wrapper) = registry.get(&name) {
                    let now = SystemClock.now_ms();
                    wrapper.broadcaster().publish(corral_adapters::liveness_event(&name, now));
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STALE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let closed = subscriptions.stale_sweep();
            if !closed.is_empty() {
                tracing::debug!(count = closed.len(), "closed stale subscriptions");
            }
        }
    });
}

fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }
    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, config::ConfigError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(config::ConfigError::NoStateDir)?,
        config.log_path.file_name().ok_or(config::ConfigError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
