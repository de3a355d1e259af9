//! Line console driving a [`ControlSurface`].
//!
//! Input lines arrive on a channel so the loop can also stop when the
//! session ends, without waiting for the next line.

use core::fmt::Write;
use std::io::{self, BufRead};
use std::thread;

use crossbeam_channel::{select, Receiver};
use tracing::warn;

use super::{execute, parse_line, Outcome};
use crate::session::{ControlSurface, Notification};

/// Version string (set by build.rs, includes git hash)
pub const VERSION: &str = env!("VERSION_STRING");

const PROMPT: &str = "wk> ";

/// Why [`Console::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The user typed `quit`.
    Quit,
    EndOfInput,
    /// The session ended under the console (fault or teardown).
    SessionEnded,
}

/// Line-oriented console.
pub struct Console<'a> {
    surface: &'a dyn ControlSurface,
    commands_run: u32,
    errors: u32,
}

impl<'a> Console<'a> {
    pub fn new(surface: &'a dyn ControlSurface) -> Self {
        Self {
            surface,
            commands_run: 0,
            errors: 0,
        }
    }

    pub fn print_banner(&self, out: &mut dyn Write) {
        let _ = writeln!(out, "{}", VERSION);
        let _ = writeln!(out, "Type 'help' for commands");
        self.print_prompt(out);
    }

    pub fn print_prompt(&self, out: &mut dyn Write) {
        let _ = write!(out, "{}", PROMPT);
    }

    /// Run one line. Errors are printed, not returned.
    pub fn process_line(&mut self, line: &str, out: &mut dyn Write) -> Outcome {
        let cmd = parse_line(line);
        if cmd.is_empty() {
            return Outcome::Continue;
        }
        self.commands_run += 1;
        match execute(&cmd, self.surface, out) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.errors += 1;
                let _ = writeln!(out, "{}", err);
                Outcome::Continue
            }
        }
    }

    /// Run lines from `lines` until `quit`, end of input, or a message
    /// (or hang-up) on `ended`. Output for each line is handed to `emit`
    /// once the command has finished.
    pub fn run(
        &mut self,
        lines: &Receiver<String>,
        ended: &Receiver<()>,
        mut emit: impl FnMut(&str),
    ) -> ConsoleExit {
        let mut out = String::new();
        self.print_banner(&mut out);
        emit(&out);

        loop {
            select! {
                recv(lines) -> line => {
                    let Ok(line) = line else {
                        return ConsoleExit::EndOfInput;
                    };
                    out.clear();
                    if self.process_line(&line, &mut out) == Outcome::Quit {
                        emit(&out);
                        return ConsoleExit::Quit;
                    }
                    self.print_prompt(&mut out);
                    emit(&out);
                }
                recv(ended) -> _ => return ConsoleExit::SessionEnded,
            }
        }
    }

    pub fn commands_run(&self) -> u32 {
        self.commands_run
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }
}

/// Forward lines of `input` to a channel from a background thread.
///
/// The channel closes at end of input or on a read error. The thread is
/// not joined: a blocked terminal read cannot be interrupted.
pub fn spawn_line_reader<R>(input: R) -> io::Result<Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new().name("console-input".into()).spawn(move || {
        for line in input.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "console input failed");
                    break;
                }
            }
        }
    })?;
    Ok(rx)
}

/// One-line rendering of a session notification.
pub fn format_notification(note: &Notification) -> String {
    match note {
        Notification::Connected { port, firmware } => {
            format!("connected to {} (firmware {})", port, firmware)
        }
        Notification::Decoded(c) => format!("rx {}", c),
        Notification::Speed(wpm) => format!("pot {} wpm", wpm),
        Notification::Fault(code) => format!("session ended: {}", code.message()),
        Notification::Disconnected => "disconnected".to_string(),
    }
}

