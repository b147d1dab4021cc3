//! `corral agent logs`.

use crate::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn logs_fails_for_an_agent_that_was_never_created() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();

    corral.corral().args(&["agent", "logs", "ghost"]).fails().stderr_has("no logs found");
}

#[test]
#[serial]
fn logs_show_sanitized_output_from_the_process() {
    let corral = Corral::empty();
    corral.spawn("printer", &["sh", "-c", "echo plain-line"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        corral.corral().args(&["agent", "logs", "printer"]).passes().stdout().contains("plain-line")
    }));
}

#[test]
#[serial]
fn logs_respects_the_limit_flag() {
    let corral = Corral::empty();
    corral.spawn("counter", &["sh", "-c", "for i in $(seq 1 20); do echo line-$i; done"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        corral.corral().args(&["agent", "logs", "counter"]).passes().stdout().contains("line-20")
    }));

    let run = corral.corral().args(&["agent", "logs", "counter", "-n", "5"]).passes();
    let stdout = run.stdout();
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
    assert!(lines.len() <= 5, "expected at most 5 lines, got {}", lines.len());
}
