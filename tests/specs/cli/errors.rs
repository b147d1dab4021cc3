//! Top-level CLI error handling: unknown subcommands, missing args, and
//! the format_error chain deduplication.

use crate::prelude::*;
use serial_test::serial;

#[test]
fn unknown_subcommand_is_a_clap_usage_error() {
    let corral = Corral::empty();
    let run = corral.corral().args(&["not-a-command"]).fails();
    assert_eq!(run.code(), Some(2));
}

#[test]
fn agent_create_without_a_command_is_a_clap_usage_error() {
    let corral = Corral::empty();
    let run = corral.corral().args(&["agent", "create", "watcher"]).fails();
    assert_eq!(run.code(), Some(2));
}

#[test]
#[serial]
fn queries_before_any_daemon_start_report_daemon_not_running() {
    let corral = Corral::empty();
    corral.corral().args(&["agent", "show", "watcher"]).fails().stderr_has("daemon not running");
}

#[test]
fn help_flag_exits_zero_and_lists_every_top_level_command() {
    let corral = Corral::empty();
    let run = corral.corral().args(&["--help"]).passes();
    run.stdout_has("agent").stdout_has("daemon").stdout_has("extractions").stdout_has("sessions").stdout_has("replay");
}
