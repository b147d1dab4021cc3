// SPDX-License-Identifier: MIT

use super::*;

fn agent() -> Agent {
    Agent::new(
        AgentId::new("worker-1"),
        "claude".into(),
        vec!["--print".into()],
        "default".into(),
        PathBuf::from("/tmp"),
        0,
    )
}

#[test]
fn new_agent_starts_created() {
    assert_eq!(agent().state, AgentState::Created);
}

#[test]
fn legal_lifecycle_transitions_succeed() {
    let mut a = agent();
    a.transition(AgentState::Starting).unwrap();
    a.transition(AgentState::Running).unwrap();
    a.transition(AgentState::Paused).unwrap();
    a.transition(AgentState::Running).unwrap();
    a.transition(AgentState::Completed).unwrap();
    assert_eq!(a.state, AgentState::Completed);
}

#[test]
fn pause_requires_running() {
    let mut a = agent();
    let err = a.transition(AgentState::Paused).unwrap_err();
    assert!(err.contains("created"));
    assert!(err.contains("paused"));
}

#[test]
fn cannot_leave_terminal_state() {
    let mut a = agent();
    a.transition(AgentState::Starting).unwrap();
    a.transition(AgentState::Running).unwrap();
    a.transition(AgentState::Killed).unwrap();
    assert!(a.transition(AgentState::Running).is_err());
}

#[test]
fn terminal_states_are_flagged() {
    assert!(AgentState::Completed.is_terminal());
    assert!(AgentState::Failed.is_terminal());
    assert!(AgentState::Killed.is_terminal());
    assert!(!AgentState::Running.is_terminal());
    assert!(!AgentState::Paused.is_terminal());
}

#[test]
fn classify_matches_known_buckets() {
    assert_eq!(AgentError::classify("Invalid API key"), AgentError::Unauthorized);
    assert_eq!(AgentError::classify("quota exceeded"), AgentError::OutOfCredits);
    assert_eq!(AgentError::classify("connection refused"), AgentError::NoInternet);
    assert_eq!(AgentError::classify("Rate limit hit"), AgentError::RateLimited);
    assert_eq!(
        AgentError::classify("disk full"),
        AgentError::Other("disk full".to_string())
    );
}

#[test]
fn display_messages_are_human_readable() {
    assert_eq!(AgentState::Paused.to_string(), "paused");
    assert_eq!(AgentError::OutOfCredits.to_string(), "out of credits");
}
