//! Line console for controlling a running bridge.
//!
//! Reads whole lines from stdin; no line editing, history or completion.

pub mod commands;
pub mod console;
pub mod error;
pub mod parser;

pub use commands::{execute, find_command, Outcome, COMMANDS};
pub use console::{format_notification, spawn_line_reader, Console, ConsoleExit, VERSION};
pub use error::ConsoleError;
pub use parser::{parse_line, parse_switch, ParsedCommand};
