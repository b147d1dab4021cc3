// SPDX-License-Identifier: MIT

use clap::Parser;

use super::Cli;

#[test]
fn parses_agent_list() {
    let cli = Cli::parse_from(["corral", "agent", "list"]);
    assert!(matches!(cli.command, super::Commands::Agent(_)));
}

#[test]
fn parses_output_flag() {
    let cli = Cli::parse_from(["corral", "-o", "json", "agent", "list"]);
    assert!(matches!(cli.output, super::OutputFormat::Json));
}

#[test]
fn default_output_is_text() {
    let cli = Cli::parse_from(["corral", "agent", "list"]);
    assert!(matches!(cli.output, super::OutputFormat::Text));
}

#[test]
fn parses_replay_with_format_and_speed() {
    let cli = Cli::parse_from(["corral", "replay", "abc123", "--format", "json", "--speed", "2.0"]);
    let super::Commands::Replay(args) = cli.command else { panic!("expected Replay") };
    assert_eq!(args.session_id, "abc123");
    assert_eq!(args.speed, 2.0);
}

#[test]
fn format_error_skips_redundant_chain() {
    let err = anyhow::anyhow!("daemon not running");
    assert_eq!(super::format_error(&err), "daemon not running");
}
