//! Log output: subscriber setup and the engine log drain.
//!
//! # Wiring
//!
//! ```text
//! LogStream (engine) ──▶ drain thread ──▶ tracing ──▶ fmt layer ──▶ stderr
//! other modules ───────────────────────▶ tracing ──┘
//! ```
//!
//! # Filter priority (highest to lowest)
//!
//! 1. `WK_BRIDGE_LOG` env var
//! 2. `RUST_LOG` env var
//! 3. CLI verbosity flags
//! 4. Default level: `info`

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::logging::{DrainWait, LogDrain, LogEntry, LogLevel};

/// Environment variable with per-target filter directives.
pub const LOG_ENV: &str = "WK_BRIDGE_LOG";

/// How often dropped-entry counts are reported.
const DROP_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Drain poll interval.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::WARN,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(verbosity.default_level().as_str().to_ascii_lowercase())
}

/// Install the global subscriber (stderr, env filter).
///
/// Returns an error if a subscriber is already installed.
pub fn init_subscriber(verbosity: Verbosity) -> Result<(), tracing_subscriber::util::TryInitError> {
    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(true);

    tracing_subscriber::registry()
        .with(build_env_filter(verbosity))
        .with(fmt_layer)
        .try_init()
}

/// Forward one engine entry to tracing.
pub fn emit(entry: &LogEntry) {
    let t_us = entry.timestamp_us;
    let msg = entry.msg.as_str();
    match entry.level {
        LogLevel::Error => tracing::error!(target: "wk_bridge::engine", t_us, "{}", msg),
        LogLevel::Warn => tracing::warn!(target: "wk_bridge::engine", t_us, "{}", msg),
        LogLevel::Info => tracing::info!(target: "wk_bridge::engine", t_us, "{}", msg),
        LogLevel::Debug => tracing::debug!(target: "wk_bridge::engine", t_us, "{}", msg),
        LogLevel::Trace => tracing::trace!(target: "wk_bridge::engine", t_us, "{}", msg),
    }
}

/// Drain `drain` into tracing until every producer is gone.
///
/// Reports dropped entries every ten seconds.
pub fn run_drain(drain: LogDrain) {
    let mut last_report = Instant::now();
    loop {
        match drain.wait(DRAIN_POLL) {
            DrainWait::Entry(entry) => emit(&entry),
            DrainWait::Idle => {}
            DrainWait::Closed => break,
        }

        if last_report.elapsed() >= DROP_REPORT_INTERVAL {
            let dropped = drain.dropped();
            if dropped > 0 {
                tracing::warn!(dropped, "engine log entries dropped");
                drain.reset_dropped();
            }
            last_report = Instant::now();
        }
    }

    let dropped = drain.dropped();
    if dropped > 0 {
        tracing::warn!(dropped, "engine log entries dropped");
    }
}

/// Spawn [`run_drain`] on its own thread.
pub fn spawn_drain(drain: LogDrain) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("log-drain".into())
        .spawn(move || run_drain(drain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::log_stream;

    #[test]
    fn test_drain_exits_when_producers_gone() {
        let (stream, drain) = log_stream(8);
        stream.push(LogLevel::Info, "hello".to_string());
        let handle = spawn_drain(drain).unwrap();
        drop(stream);
        handle.join().unwrap();
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
        assert_eq!(Verbosity::Normal.default_level(), Level::INFO);
    }
}
