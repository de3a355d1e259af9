//! Command handlers

use core::fmt::Write;

use super::parser::{parse_switch, ParsedCommand};
use super::ConsoleError;
use crate::keys::KeyingMode;
use crate::protocol::StatusByte;
use crate::session::ControlSurface;
use crate::timing::is_plausible;

/// What the console loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

type Handler = fn(&ParsedCommand<'_>, &dyn ControlSurface, &mut dyn Write) -> Result<Outcome, ConsoleError>;

/// Command descriptor
pub struct CommandDescriptor {
    pub name: &'static str,
    pub usage: &'static str,
    pub brief: &'static str,
    /// Most arguments the command accepts.
    pub max_args: usize,
    pub handler: Handler,
}

/// All available commands
pub static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor { name: "help", usage: "help [cmd]", brief: "List commands", max_args: 1, handler: cmd_help },
    CommandDescriptor { name: "swap", usage: "swap on|off", brief: "Swap DIT-key and DAH-key", max_args: 1, handler: cmd_swap },
    CommandDescriptor { name: "mute", usage: "mute on|off", brief: "Mute keyer sidetone", max_args: 1, handler: cmd_mute },
    CommandDescriptor { name: "wpm", usage: "wpm <n>|pot", brief: "Override speed or follow the pot", max_args: 1, handler: cmd_wpm },
    CommandDescriptor { name: "mode", usage: "mode iambic|straight", brief: "Key mapping on the remote side", max_args: 1, handler: cmd_mode },
    CommandDescriptor { name: "keyerswap", usage: "keyerswap on|off", brief: "Paddle swap bit in the keyer", max_args: 1, handler: cmd_keyerswap },
    CommandDescriptor { name: "status", usage: "status", brief: "Session status", max_args: 0, handler: cmd_status },
    CommandDescriptor { name: "quit", usage: "quit", brief: "Disconnect and exit", max_args: 0, handler: cmd_quit },
];

/// Execute a parsed command
pub fn execute(
    cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    if cmd.is_empty() {
        return Ok(Outcome::Continue); // Empty line, do nothing
    }

    let handler = find_command(cmd.command).ok_or(ConsoleError::UnknownCommand)?;
    if cmd.arg_count() > handler.max_args {
        return Err(ConsoleError::InvalidValue);
    }
    (handler.handler)(cmd, surface, out)
}

/// Look up a command by name, ignoring case.
pub fn find_command(name: &str) -> Option<&'static CommandDescriptor> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

// --- Command Implementations ---

fn cmd_help(
    cmd: &ParsedCommand<'_>,
    _surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    if let Some(name) = cmd.arg(0) {
        let c = find_command(name).ok_or(ConsoleError::UnknownCommand)?;
        let _ = writeln!(out, "{}: {}", c.usage, c.brief);
    } else {
        for c in COMMANDS {
            let _ = writeln!(out, "  {:<22} {}", c.usage, c.brief);
        }
    }
    Ok(Outcome::Continue)
}

fn switch_arg(cmd: &ParsedCommand<'_>) -> Result<bool, ConsoleError> {
    let value = cmd.arg(0).ok_or(ConsoleError::MissingArg)?;
    parse_switch(value).ok_or(ConsoleError::InvalidValue)
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn cmd_swap(
    cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    let swap = switch_arg(cmd)?;
    surface.set_paddle_swap(swap)?;
    let _ = writeln!(out, "swap={} (from next character)", on_off(swap));
    Ok(Outcome::Continue)
}

fn cmd_mute(
    cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    let muted = switch_arg(cmd)?;
    surface.set_mute_sidetone(muted)?;
    let _ = writeln!(out, "mute={}", on_off(muted));
    Ok(Outcome::Continue)
}

fn cmd_wpm(
    cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    let value = cmd.arg(0).ok_or(ConsoleError::MissingArg)?;
    if value.eq_ignore_ascii_case("pot") {
        surface.set_speed_override(None)?;
        let _ = writeln!(out, "wpm=pot");
        return Ok(Outcome::Continue);
    }

    let wpm: u32 = value.parse().map_err(|_| ConsoleError::InvalidValue)?;
    if !is_plausible(wpm) {
        return Err(ConsoleError::OutOfRange);
    }
    surface.set_speed_override(Some(wpm))?;
    let _ = writeln!(out, "wpm={}", wpm);
    Ok(Outcome::Continue)
}

fn cmd_mode(
    cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    let value = cmd.arg(0).ok_or(ConsoleError::MissingArg)?;
    let mode = match value.to_ascii_lowercase().as_str() {
        "iambic" => KeyingMode::Iambic,
        "straight" => KeyingMode::Straight,
        _ => return Err(ConsoleError::InvalidValue),
    };
    surface.set_keying_mode(mode)?;
    let _ = writeln!(out, "mode={}", value.to_ascii_lowercase());
    Ok(Outcome::Continue)
}

fn cmd_keyerswap(
    cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    let swap = switch_arg(cmd)?;
    surface.set_device_paddle_swap(swap)?;
    let _ = writeln!(out, "keyerswap={}", on_off(swap));
    Ok(Outcome::Continue)
}

fn cmd_status(
    _cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    let s = surface.status();

    let _ = writeln!(
        out,
        "link:     {} {} (fw {})",
        s.port,
        if s.connected { "connected" } else { "closed" },
        s.firmware
    );
    match s.speed_override {
        Some(wpm) => {
            let _ = writeln!(out, "speed:    {} wpm (override, pot {})", wpm, s.pot_wpm);
        }
        None => {
            let _ = writeln!(out, "speed:    {} wpm (pot)", s.engine.wpm);
        }
    }
    let _ = writeln!(
        out,
        "keys:     mode={:?} swap={} keyerswap={} mute={}",
        s.keying_mode,
        on_off(s.paddle_swap),
        on_off(s.device_paddle_swap),
        on_off(s.sidetone_muted)
    );
    let _ = writeln!(
        out,
        "engine:   {:?} queued={} emitted={} skipped={} overflows={} noise={}",
        s.engine.state, s.engine.queued, s.engine.emitted, s.engine.skipped, s.engine.overflows, s.engine.speed_noise
    );
    let _ = writeln!(out, "received: {} chars", s.chars_received);
    if let Some(status) = s.last_status {
        write_status_byte(out, status);
    }
    if s.fault.active {
        let _ = writeln!(out, "fault:    {} (total {})", s.fault.code.message(), s.fault.count);
    }
    Ok(Outcome::Continue)
}

fn write_status_byte(out: &mut dyn Write, status: StatusByte) {
    let _ = write!(out, "keyer:    0x{:02X}", status.bits());
    for (set, name) in [
        (status.wait(), "wait"),
        (status.key_down(), "keydown"),
        (status.busy(), "busy"),
        (status.break_in(), "breakin"),
        (status.xoff(), "xoff"),
    ] {
        if set {
            let _ = write!(out, " {}", name);
        }
    }
    let _ = writeln!(out);
}

fn cmd_quit(
    _cmd: &ParsedCommand<'_>,
    surface: &dyn ControlSurface,
    out: &mut dyn Write,
) -> Result<Outcome, ConsoleError> {
    surface.disconnect()?;
    let _ = writeln!(out, "disconnected");
    Ok(Outcome::Quit)
}
