// SPDX-License-Identifier: MIT

//! Agent identifier, lifecycle state, and the supervised-process record.
//!
//! An [`Agent`] is the record a [`crate::session`]'s `ProcessWrapper` (in
//! `corral-adapters`) owns exclusively for the lifetime of one spawned child.
//! `AgentId` is the operator-chosen stable name; it outlives any individual
//! [`crate::session::Session`] that name accumulates over time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Stable, operator-chosen name for a supervised agent.
    ///
    /// Unique among currently-supervised agents. A given name may be reused
    /// across many [`crate::session::Session`]s over the agent's lifetime.
    pub struct AgentId;
}

/// Lifecycle state of a supervised agent.
///
/// Transitions: `Created -> Starting -> Running -> (Paused <-> Running)* ->
/// {Completed, Failed, Killed}`. Mutated only by the `ProcessWrapper` that
/// owns the agent; every transition is also appended to the session's
/// [`crate::session::StateChange`] log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Created,
    Starting,
    Running,
    Paused,
    Completed,
    Failed,
    Killed,
}

impl AgentState {
    /// Whether `to` is a legal transition from `self`.
    pub fn can_transition_to(self, to: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, to),
            (Created, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Killed)
                | (Paused, Killed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Completed | AgentState::Failed | AgentState::Killed)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Created => "created",
            AgentState::Starting => "starting",
            AgentState::Running => "running",
            AgentState::Paused => "paused",
            AgentState::Completed => "completed",
            AgentState::Failed => "failed",
            AgentState::Killed => "killed",
        };
        write!(f, "{s}")
    }
}

/// Categorized failure reason attached to a `Failed` terminal state.
///
/// Supplements spec's bare `{completed, failed, killed}` terminal states
/// with a classification of *why* an agent failed, inferred from stderr/log
/// content by the caller (typically the extractor's error-category matches).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentError {
    Unauthorized,
    OutOfCredits,
    NoInternet,
    RateLimited,
    Other(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Unauthorized => write!(f, "unauthorized"),
            AgentError::OutOfCredits => write!(f, "out of credits"),
            AgentError::NoInternet => write!(f, "no internet connection"),
            AgentError::RateLimited => write!(f, "rate limited"),
            AgentError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl AgentError {
    /// Classify a lowercased error/stderr fragment, matching the same
    /// substring buckets watcher-style state detection uses upstream.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |ps: &[&str]| ps.iter().any(|p| lower.contains(p));
        if has(&["unauthorized", "invalid api key"]) {
            AgentError::Unauthorized
        } else if has(&["credit", "quota", "billing"]) {
            AgentError::OutOfCredits
        } else if has(&["network", "connection refused", "offline"]) {
            AgentError::NoInternet
        } else if has(&["rate limit", "too many requests"]) {
            AgentError::RateLimited
        } else {
            AgentError::Other(message.to_string())
        }
    }
}

/// A supervised child process record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub command: String,
    pub args: Vec<String>,
    pub environment: String,
    pub working_dir: PathBuf,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub state: AgentState,
    /// Wall-clock spawn time, ms since epoch.
    pub spawn_time_ms: u64,
    /// Present once the child has actually forked.
    pub pid: Option<u32>,
    /// Present once the child has exited.
    pub exit_code: Option<i32>,
    pub failure: Option<AgentError>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        command: String,
        args: Vec<String>,
        environment: String,
        working_dir: PathBuf,
        spawn_time_ms: u64,
    ) -> Self {
        Self {
            id,
            command,
            args,
            environment,
            working_dir,
            env_vars: HashMap::new(),
            state: AgentState::Created,
            spawn_time_ms,
            pid: None,
            exit_code: None,
            failure: None,
        }
    }

    /// Attempt a state transition, returning an error naming the illegal
    /// pair rather than silently ignoring it (spec's `Illegal-state-command`
    /// error kind).
    pub fn transition(&mut self, to: AgentState) -> Result<(), String> {
        if !self.state.can_transition_to(to) {
            return Err(format!("illegal transition {} -> {}", self.state, to));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
