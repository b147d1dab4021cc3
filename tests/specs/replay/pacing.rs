//! `corral replay` — speed-scaled re-emission of a finished session.
//!
//! Exercises the pacing contract directly: events recorded at relative
//! offsets `0s, 1s, 3s` replayed at `speed=2` should take roughly half the
//! original span (1.5s) to stream back, scaling every gap between events
//! by `1/speed`.

use crate::prelude::*;
use serial_test::serial;
use std::time::{Duration, Instant};

const EVENT_PATTERN: &str = r#"
[[pattern]]
name = "marker"
regex = "EVENT: (?P<msg>.+)"
category = "state"
risk_level = "low"
"#;

fn session_id_for(corral: &Corral, agent: &str) -> String {
    let run = corral.corral().args(&["-o", "json", "sessions", agent]).passes();
    let sessions: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
    sessions[0]["id"].as_str().unwrap().to_string()
}

fn extraction_span_ms(corral: &Corral, agent: &str) -> u64 {
    let run = corral.corral().args(&["-o", "json", "extractions", "--agent", agent]).passes();
    let events: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
    let timestamps: Vec<u64> = events.as_array().unwrap().iter().map(|e| e["timestamp_ms"].as_u64().unwrap()).collect();
    timestamps.iter().max().unwrap() - timestamps.iter().min().unwrap()
}

#[test]
#[serial]
fn streaming_replay_scales_gaps_by_the_inverse_of_speed() {
    let corral = Corral::empty();
    corral.write_patterns(EVENT_PATTERN);
    corral.spawn(
        "timed",
        &["sh", "-c", "echo 'EVENT: one'; sleep 1; echo 'EVENT: two'; sleep 2; echo 'EVENT: three'"],
    );

    assert!(wait_for(4000, || {
        corral.corral().args(&["sessions", "timed"]).passes().stdout().contains("ended")
    }));
    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        let run = corral.corral().args(&["-o", "json", "extractions", "--agent", "timed"]).passes();
        let events: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
        events.as_array().map(|a| a.len()).unwrap_or(0) >= 3
    }));

    let span_ms = extraction_span_ms(&corral, "timed");
    let session_id = session_id_for(&corral, "timed");

    let expected_ms = (span_ms as f64 / 2.0) as u64;

    let start = Instant::now();
    corral.corral().args(&["replay", &session_id, "--speed", "2"]).passes();
    let elapsed = start.elapsed();

    // Generous tolerance: process scheduling jitter on a loaded CI box can
    // easily add a few hundred ms either way.
    let lower = Duration::from_millis(expected_ms.saturating_sub(700));
    let upper = expected_ms + 1500;
    assert!(
        elapsed >= lower && elapsed <= Duration::from_millis(upper),
        "replay at speed=2 took {elapsed:?}, expected roughly {expected_ms}ms (span {span_ms}ms)"
    );
}

#[test]
#[serial]
fn streaming_replay_at_speed_one_takes_roughly_the_original_span() {
    let corral = Corral::empty();
    corral.write_patterns(EVENT_PATTERN);
    corral.spawn("timed", &["sh", "-c", "echo 'EVENT: one'; sleep 1; echo 'EVENT: two'"]);

    assert!(wait_for(4000, || corral.corral().args(&["sessions", "timed"]).passes().stdout().contains("ended")));
    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        let run = corral.corral().args(&["-o", "json", "extractions", "--agent", "timed"]).passes();
        let events: serde_json::Value = serde_json::from_str(&run.stdout()).unwrap();
        events.as_array().map(|a| a.len()).unwrap_or(0) >= 2
    }));

    let span_ms = extraction_span_ms(&corral, "timed");
    let session_id = session_id_for(&corral, "timed");

    let start = Instant::now();
    corral.corral().args(&["replay", &session_id]).passes();
    let elapsed = start.elapsed();

    let lower = Duration::from_millis(span_ms.saturating_sub(700));
    let upper = span_ms + 1500;
    assert!(
        elapsed >= lower && elapsed <= Duration::from_millis(upper),
        "replay at default speed took {elapsed:?}, expected roughly {span_ms}ms"
    );
}
