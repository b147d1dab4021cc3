//! `corral extractions`.

use crate::prelude::*;
use serial_test::serial;

const ERROR_PATTERN: &str = r#"
[[pattern]]
name = "shell_error"
regex = "ERROR: (?P<msg>.+)"
category = "error"
risk_level = "high"
"#;

#[test]
#[serial]
fn reports_no_extractions_before_anything_matches() {
    let corral = Corral::empty();
    corral.corral().args(&["daemon", "start"]).passes();

    corral.corral().args(&["extractions"]).passes().stdout_has("no extractions found");
}

#[test]
#[serial]
fn a_matched_line_shows_up_in_the_query() {
    let corral = Corral::empty();
    corral.write_patterns(ERROR_PATTERN);
    corral.spawn("watcher", &["sh", "-c", "echo 'ERROR: disk full'"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        corral.corral().args(&["-o", "json", "extractions"]).passes().stdout().contains("disk full")
    }));

    let run = corral.corral().args(&["extractions"]).passes();
    run.stdout_has("watcher").stdout_has("shell_error").stdout_has("high");
}

#[test]
#[serial]
fn filters_by_agent_name() {
    let corral = Corral::empty();
    corral.write_patterns(ERROR_PATTERN);
    corral.spawn("alpha", &["sh", "-c", "echo 'ERROR: alpha failed'"]);
    corral.spawn("beta", &["sh", "-c", "echo 'ERROR: beta failed'"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        let run = corral.corral().args(&["-o", "json", "extractions"]).passes();
        let events: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
        events.as_array().map(|a| a.len()).unwrap_or(0) >= 2
    }));

    let run = corral.corral().args(&["extractions", "--agent", "alpha"]).passes();
    run.stdout_has("alpha").stdout_lacks("beta");
}

#[test]
#[serial]
fn duplicate_matches_on_the_same_line_are_not_double_counted() {
    let corral = Corral::empty();
    corral.write_patterns(ERROR_PATTERN);
    corral.spawn("watcher", &["sh", "-c", "echo 'ERROR: boom'; echo 'ERROR: boom'"]);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        let run = corral.corral().args(&["-o", "json", "extractions"]).passes();
        let events: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
        events.as_array().map(|a| a.len()).unwrap_or(0) >= 2
    }));

    // Two distinct lines with identical content are two extraction events,
    // not deduplicated away — dedup only collapses true repeats within one
    // extractor pass, not repeated program output.
    let run = corral.corral().args(&["-o", "json", "extractions"]).passes();
    let events: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
    assert_eq!(events.as_array().unwrap().len(), 2);
}
