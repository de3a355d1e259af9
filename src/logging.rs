//! Non-blocking logging for the timed keying path.
//!
//! # Architecture
//!
//! ```text
//! Engine thread          LogStream             Drain thread
//! ─────────────          ─────────             ────────────
//!
//! rt_log!() ──────────▶ [L0][L1][L2] ──────▶ tracing subscriber
//! try_send               bounded ring          blocking ok
//! never blocks           drop when full
//! ```
//!
//! The engine holds keys for tens of milliseconds at a time; a stalled
//! stderr must not stretch a dit. Everything outside the engine logs
//! through `tracing` directly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

/// Maximum message length; longer messages are truncated.
pub const MAX_MSG_LEN: usize = 120;

/// Default ring size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 256;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// A single log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Microseconds since the stream was created.
    pub timestamp_us: u64,
    pub level: LogLevel,
    pub msg: String,
}

/// Producer side of the log ring. Clones share the ring.
#[derive(Clone)]
pub struct LogStream {
    tx: Sender<LogEntry>,
    epoch: Instant,
    dropped: Arc<AtomicU32>,
}

/// Consumer side of the log ring.
pub struct LogDrain {
    rx: Receiver<LogEntry>,
    dropped: Arc<AtomicU32>,
}

/// Outcome of [`LogDrain::wait`].
#[derive(Debug)]
pub enum DrainWait {
    Entry(LogEntry),
    /// Timed out with nothing queued.
    Idle,
    /// Every producer is gone and the ring is empty.
    Closed,
}

/// Create a ring holding up to `capacity` entries.
pub fn log_stream(capacity: usize) -> (LogStream, LogDrain) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let dropped = Arc::new(AtomicU32::new(0));
    (
        LogStream {
            tx,
            epoch: Instant::now(),
            dropped: Arc::clone(&dropped),
        },
        LogDrain { rx, dropped },
    )
}

impl LogStream {
    /// Queue an entry. Never blocks.
    ///
    /// Returns `true` if queued, `false` if dropped (ring full or drain
    /// gone).
    pub fn push(&self, level: LogLevel, msg: String) -> bool {
        let mut msg = msg;
        if msg.len() > MAX_MSG_LEN {
            let mut cut = MAX_MSG_LEN;
            while !msg.is_char_boundary(cut) {
                cut -= 1;
            }
            msg.truncate(cut);
        }
        let entry = LogEntry {
            timestamp_us: self.epoch.elapsed().as_micros() as u64,
            level,
            msg,
        };
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Get count of dropped messages.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl LogDrain {
    /// Wait up to `timeout` for an entry.
    pub fn wait(&self, timeout: Duration) -> DrainWait {
        match self.rx.recv_timeout(timeout) {
            Ok(entry) => DrainWait::Entry(entry),
            Err(RecvTimeoutError::Timeout) => DrainWait::Idle,
            Err(RecvTimeoutError::Disconnected) => DrainWait::Closed,
        }
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset dropped counter (e.g., after reporting).
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }
}

/// Non-blocking log macro for the keying path.
///
/// # Example
///
/// ```ignore
/// rt_log!(LogLevel::Info, stream, "char {} @ {} wpm", c, wpm);
/// ```
#[macro_export]
macro_rules! rt_log {
    ($level:expr, $stream:expr, $($arg:tt)*) => {{
        $stream.push($level, ::std::format!($($arg)*));
    }};
}

/// Non-blocking info log.
#[macro_export]
macro_rules! rt_info {
    ($stream:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Info, $stream, $($arg)*)
    };
}

/// Non-blocking warning log.
#[macro_export]
macro_rules! rt_warn {
    ($stream:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Warn, $stream, $($arg)*)
    };
}

/// Non-blocking debug log.
#[macro_export]
macro_rules! rt_debug {
    ($stream:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Debug, $stream, $($arg)*)
    };
}

/// Non-blocking trace log (maximum verbosity).
#[macro_export]
macro_rules! rt_trace {
    ($stream:expr, $($arg:tt)*) => {
        $crate::rt_log!($crate::logging::LogLevel::Trace, $stream, $($arg)*)
    };
}
