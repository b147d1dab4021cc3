// SPDX-License-Identifier: MIT

use super::*;
use corral_core::{Event, EventPayload, SessionId};

#[test]
fn format_time_ago_zero_is_dash() {
    assert_eq!(format_time_ago(0), "-");
}

#[test]
fn format_time_ago_seconds() {
    let now_ms =
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_millis() as u64;
    let ago = format_time_ago(now_ms - 5_000);
    assert!(ago.ends_with('s'), "expected seconds suffix, got {ago}");
}

#[test]
fn format_event_renders_log_line() {
    let event = Event::new("builder", 0, EventPayload::Log { stream: "stdout".into(), line_number: 1, line: "hello".into() });
    let rendered = format_event(&event, false).unwrap();
    assert!(rendered.contains("hello"));
}

#[test]
fn format_event_skips_ping() {
    let event = Event::ping("builder", 0);
    assert!(format_event(&event, false).is_none());
}

#[test]
fn format_event_renders_state_change() {
    let event = Event::new(
        "builder",
        0,
        EventPayload::State { session_id: SessionId::new("s1"), state: "running".into() },
    );
    let rendered = format_event(&event, false).unwrap();
    assert!(rendered.contains("state -> running"));
}
