//! `corral agent pause|resume|kill|send|signal`.

use crate::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn pause_then_resume_round_trips_through_running() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral.corral().args(&["agent", "pause", "watcher"]).passes().stdout_has("watcher: paused");
    corral
        .corral()
        .args(&["agent", "show", "watcher"])
        .passes()
        .stdout_has("state: paused");

    corral.corral().args(&["agent", "resume", "watcher"]).passes().stdout_has("watcher: running");
    corral
        .corral()
        .args(&["agent", "show", "watcher"])
        .passes()
        .stdout_has("state: running");
}

#[test]
#[serial]
fn kill_stops_the_process_and_forgets_the_agent() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral.corral().args(&["agent", "kill", "watcher"]).passes().stdout_has("removed");

    corral.corral().args(&["agent", "list"]).passes().stdout_has("no agents running");
}

#[test]
#[serial]
fn send_writes_a_line_to_the_agents_stdin() {
    let corral = Corral::empty();
    // `cat` echoes stdin back to stdout, so a line sent to it should show up
    // in the agent's combined log.
    corral.spawn("echoer", &["cat"]);

    corral.corral().args(&["agent", "send", "echoer", "hello there"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        corral.corral().args(&["agent", "logs", "echoer"]).passes().stdout().contains("hello there")
    }));
}

#[test]
#[serial]
fn signal_rejects_an_unrecognized_signal_name() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral
        .corral()
        .args(&["agent", "signal", "watcher", "SIGBOGUS"])
        .fails()
        .stderr_has("known signal");
}

#[test]
#[serial]
fn signal_delivers_sigterm_and_the_agent_exits() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral.corral().args(&["agent", "signal", "watcher", "SIGTERM"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        let run = corral.corral().args(&["agent", "show", "watcher"]).passes();
        !run.stdout().contains("state: running")
    }));
}
