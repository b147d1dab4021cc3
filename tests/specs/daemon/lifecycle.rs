//! `corral daemon start|stop|restart|status` lifecycle.

use crate::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn status_reports_not_running_before_start() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "status"]).passes().stdout_has("not running");
}

#[test]
#[serial]
fn start_is_idempotent() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes().stdout_has("started");
    // Second start should recognize the daemon is already up rather than erroring.
    corral.corral().args(&["daemon", "start"]).passes().stdout_has("already running");
}

#[test]
#[serial]
fn status_reports_running_pid_and_version_after_start() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();

    let run = corral.corral().args(&["daemon", "status"]).passes();
    run.stdout_has("running").stdout_has("pid:").stdout_has("version:");
}

#[test]
#[serial]
fn stop_tears_down_the_socket_and_pid_file() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();
    assert!(corral.daemon_up());

    corral.corral().args(&["daemon", "stop"]).passes().stdout_has("stopped");

    assert!(!corral.state_path().join("corral.sock").exists());
    assert!(!corral.state_path().join("corral.pid").exists());
}

#[test]
#[serial]
fn stop_when_not_running_is_a_no_op() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "stop"]).passes().stdout_has("not running");
}

#[test]
#[serial]
fn restart_leaves_the_daemon_running_under_a_new_pid() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();
    let before = corral.daemon_pid();

    corral.corral().args(&["daemon", "restart"]).passes();

    let after = corral.daemon_pid();
    assert!(after.is_some());
    assert_ne!(before, after, "restart should replace the daemon process");
}

#[test]
#[serial]
fn mutating_commands_auto_start_the_daemon() {
    let corral = Corral::empty();
    assert!(!corral.daemon_up());

    // `agent create` uses `DaemonClient::for_action`, which auto-starts the
    // daemon if it isn't already running. `agent list` (`for_query`) does not.
    corral.spawn("watcher", &["sleep", "30"]);

    assert!(corral.daemon_up(), "an action command should auto-start the daemon");
}

#[test]
#[serial]
fn surviving_a_crash_lets_the_next_action_clean_up_and_restart() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);
    let old_pid = corral.daemon_pid();
    assert!(corral.daemon_kill());

    assert!(wait_for(SPEC_WAIT_MAX_MS, || !corral.daemon_up()));

    // A fresh action command should notice the stale socket/pid, start a new
    // daemon, and succeed rather than reporting a stale `DaemonNotRunning`.
    corral.spawn("watcher2", &["sleep", "30"]);
    assert_ne!(corral.daemon_pid(), old_pid);
}
