//! Parser tests for console command line parsing

use rust_wk_bridge::console::parser::{parse_line, parse_switch, ParsedCommand};

#[test]
fn test_parse_simple_command() {
    let cmd = parse_line("status");
    assert_eq!(cmd.command, "status");
    assert_eq!(cmd.args[0], None);
}

#[test]
fn test_parse_command_with_one_arg() {
    let cmd = parse_line("wpm 25");
    assert_eq!(cmd.command, "wpm");
    assert_eq!(cmd.args[0], Some("25"));
    assert_eq!(cmd.args[1], None);
}

#[test]
fn test_parse_command_with_two_args() {
    let cmd = parse_line("help swap now");
    assert_eq!(cmd.arg(0), Some("swap"));
    assert_eq!(cmd.arg(1), Some("now"));
    assert_eq!(cmd.arg(2), None);
    assert_eq!(cmd.extra, 0);
}

#[test]
fn test_parse_trims_whitespace() {
    let cmd = parse_line("  mode   straight  ");
    assert_eq!(cmd.command, "mode");
    assert_eq!(cmd.args[0], Some("straight"));
}

#[test]
fn test_parse_empty_line() {
    assert_eq!(parse_line(""), ParsedCommand::empty());
    assert!(parse_line("   \t ").is_empty());
}

#[test]
fn test_parse_switch() {
    assert_eq!(parse_switch("on"), Some(true));
    assert_eq!(parse_switch("Off"), Some(false));
    assert_eq!(parse_switch(""), None);
}
