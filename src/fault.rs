//! Session fault latch.
//!
//! Conditions that end a running session force every virtual key up and
//! are latched here once so the control surface can show why the bridge
//! stopped. Connect failures never reach a session; `Session::connect`
//! returns them as `LinkError`. Nothing reconnects on its own.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Why the session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultCode {
    /// No fault (normal operation or user disconnect).
    None = 0,

    /// The keyer went away mid-session (read error, unplugged).
    Disconnected = 1,

    /// Writing to the keyer failed.
    Io = 2,
}

impl FaultCode {
    /// Convert from raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => FaultCode::Disconnected,
            2 => FaultCode::Io,
            _ => FaultCode::None,
        }
    }

    /// Short text for display.
    pub fn message(self) -> &'static str {
        match self {
            FaultCode::None => "no fault",
            FaultCode::Disconnected => "keyer disconnected",
            FaultCode::Io => "serial write failed",
        }
    }
}

/// Thread-safe fault state.
///
/// Set by the session threads, polled by the control surface.
#[derive(Debug)]
pub struct FaultState {
    active: AtomicBool,
    code: AtomicU8,
    /// Total fault count since start (never cleared).
    count: AtomicU32,
}

impl FaultState {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            code: AtomicU8::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Latch a fault.
    ///
    /// Returns `true` if this call raised it, `false` if a fault was
    /// already active (the first cause wins).
    pub fn set(&self, code: FaultCode) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.code.store(code as u8, Ordering::Release);
        self.count.fetch_add(1, Ordering::Relaxed);
        true
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Fault code (only meaningful if `is_active()` is true).
    #[inline]
    pub fn code(&self) -> FaultCode {
        FaultCode::from_u8(self.code.load(Ordering::Acquire))
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FaultSnapshot {
        FaultSnapshot {
            active: self.is_active(),
            code: self.code(),
            count: self.count(),
        }
    }
}

impl Default for FaultState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of fault state at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultSnapshot {
    pub active: bool,
    pub code: FaultCode,
    pub count: u32,
}
