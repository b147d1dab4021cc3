//! `corral daemon logs`.

use crate::prelude::*;
use serial_test::serial;

#[test]
#[serial]
fn reports_missing_log_file_before_any_start() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "logs"]).passes().stdout_has("no log file found");
}

#[test]
#[serial]
fn shows_the_daemon_ready_line_after_start() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || corral.daemon_log().contains("daemon ready")));

    corral.corral().args(&["daemon", "logs"]).passes().stdout_has("daemon ready");
}
