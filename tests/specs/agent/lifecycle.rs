//! `corral agent create|list|show|delete`.

use crate::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn list_is_empty_before_anything_is_created() {
    let corral = Corral::empty();
    corral.corral().args(&["agent", "list"]).passes().stdout_has("no agents running");
}

#[test]
#[serial]
fn create_reports_name_and_session_id() {
    let corral = Corral::empty();
    corral
        .corral()
        .args(&["agent", "create", "watcher", "sleep", "30"])
        .passes()
        .stdout_has("created agent 'watcher'")
        .stdout_has("session");
}

#[test]
#[serial]
fn create_rejects_a_duplicate_name() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral
        .corral()
        .args(&["agent", "create", "watcher", "sleep", "30"])
        .fails()
        .stderr_has("already exists");
}

#[test]
#[serial]
fn list_shows_a_created_agent() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral.corral().args(&["agent", "list"]).passes().stdout_has("watcher").stdout_has("running");
}

#[test]
#[serial]
fn list_as_json_round_trips_through_serde() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    let run = corral.corral().args(&["-o", "json", "agent", "list"]).passes();
    let agents: serde_json::Value = serde_json::from_str(&run.stdout()).expect("valid json");
    assert_eq!(agents[0]["name"], "watcher");
}

#[test]
#[serial]
fn show_reports_state_and_session() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral
        .corral()
        .args(&["agent", "show", "watcher"])
        .passes()
        .stdout_has("name: watcher")
        .stdout_has("session:")
        .stdout_has("lines processed:");
}

#[test]
#[serial]
fn show_fails_for_an_unknown_agent() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();

    corral.corral().args(&["agent", "show", "ghost"]).fails().stderr_has("not found");
}

#[test]
#[serial]
fn delete_removes_the_agent_from_the_list() {
    let corral = Corral::empty();
    corral.spawn("watcher", &["sleep", "30"]);

    corral.corral().args(&["agent", "delete", "watcher"]).passes().stdout_has("deleted agent 'watcher'");
    corral.corral().args(&["agent", "list"]).passes().stdout_has("no agents running");
}

#[test]
#[serial]
fn create_honors_a_custom_working_directory() {
    let corral = Corral::empty();
    let workdir = tempfile::tempdir().unwrap();
    let dir = workdir.path().to_str().unwrap();

    corral
        .corral()
        .args(&["agent", "create", "reader", "-C", dir, "sleep", "30"])
        .passes();

    corral.corral().args(&["agent", "list"]).passes().stdout_has("reader");
}
