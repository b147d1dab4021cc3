//! `corral sessions`.

use crate::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn reports_no_sessions_for_an_agent_that_never_ran() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();

    corral.corral().args(&["sessions", "ghost"]).passes().stdout_has("no sessions found for agent 'ghost'");
}

#[test]
#[serial]
fn an_active_agent_shows_up_as_an_active_session() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        corral.corral().args(&["sessions", "watcher"]).passes().stdout().contains("active")
    }));

    corral.corral().args(&["sessions", "watcher", "--active-only"]).passes().stdout_has("active");
}

#[test]
#[serial]
fn a_finished_agent_session_is_marked_ended() {
    let corral = Corral::empty();
    corral.spawn("oneshot", &["sh", "-c", "echo done"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        corral.corral().args(&["sessions", "oneshot"]).passes().stdout().contains("ended")
    }));
}
