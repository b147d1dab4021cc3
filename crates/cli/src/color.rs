// SPDX-License-Identifier: MIT

use clap::builder::styling::{Ansi256Color, Color, Style, Styles};
use std::io::IsTerminal;

pub mod codes {
    pub const HEADER: u8 = 74;
    pub const LITERAL: u8 = 250;
    pub const CONTEXT: u8 = 245;
    pub const MUTED: u8 = 240;
}

/// Determine if color output should be enabled.
///
/// Priority: `NO_COLOR=1` disables -> `COLOR=1` forces -> TTY check.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    if std::env::var("COLOR").is_ok_and(|v| v == "1") {
        return true;
    }
    std::io::stdout().is_terminal()
}

/// Build clap `Styles` using the project palette.
pub fn styles() -> Styles {
    if !should_colorize() {
        return Styles::plain();
    }
    Styles::styled()
        .usage(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::HEADER)))))
        .header(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::HEADER)))))
        .literal(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::LITERAL)))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::CONTEXT)))))
}

fn fg256(code: u8) -> String {
    format!("\x1b[38;5;{code}m")
}

const RESET: &str = "\x1b[0m";

pub fn apply_header(text: &str) -> String {
    if should_colorize() {
        format!("{}{}{}", fg256(codes::HEADER), text, RESET)
    } else {
        text.to_string()
    }
}

pub fn apply_muted(text: &str) -> String {
    if should_colorize() {
        format!("{}{}{}", fg256(codes::MUTED), text, RESET)
    } else {
        text.to_string()
    }
}

/// Colorize an agent/session state string by its semantic meaning.
///
/// Green: running, spawning, ready. Yellow: paused, pausing, stopping.
/// Red: failed, crashed, killed. Default (no color): unrecognized states.
pub fn apply_status(text: &str) -> String {
    if !should_colorize() {
        return text.to_string();
    }
    let lower = text.trim_start().to_lowercase();
    let first_word = lower.split(|c: char| !c.is_alphabetic()).next().unwrap_or("");
    let code = match first_word {
        "running" | "spawning" | "ready" | "completed" => "\x1b[32m",
        "paused" | "pausing" | "stopping" | "idle" => "\x1b[33m",
        "failed" | "crashed" | "killed" | "error" => "\x1b[31m",
        _ => return text.to_string(),
    };
    format!("{code}{text}{RESET}")
}

#[cfg(test)]
#[path = "color_tests.rs"]
mod tests;
