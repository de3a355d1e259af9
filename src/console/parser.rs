//! Command line parser
//!
//! Split on whitespace, command plus at most two arguments. Command
//! names are matched case-insensitively by the dispatcher.

/// Parsed command with up to 2 arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// The command name (first token)
    pub command: &'a str,
    pub args: [Option<&'a str>; 2],
    /// Tokens beyond the second argument
    pub extra: usize,
}

impl<'a> ParsedCommand<'a> {
    pub const fn empty() -> Self {
        Self {
            command: "",
            args: [None, None],
            extra: 0,
        }
    }

    /// Get argument by index (0-based)
    pub fn arg(&self, idx: usize) -> Option<&'a str> {
        self.args.get(idx).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    /// Number of tokens after the command name.
    pub fn arg_count(&self) -> usize {
        self.args.iter().flatten().count() + self.extra
    }
}

/// Parse a command line into command and arguments
pub fn parse_line(line: &str) -> ParsedCommand<'_> {
    let mut parts = line.split_whitespace();

    let Some(command) = parts.next() else {
        return ParsedCommand::empty();
    };

    let mut args = [None, None];
    for slot in args.iter_mut() {
        *slot = parts.next();
    }

    ParsedCommand {
        command,
        args,
        extra: parts.count(),
    }
}

/// Parse an on/off style switch.
pub fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
