//! # RustWkBridge
//!
//! Bridges a WinKeyer-compatible Morse keyer to a browser keying service
//! that watches two keyboard keys.
//!
//! ## Architecture
//!
//! ```text
//! keyer ──serial──▶ link reader ──▶ engine inbox ──▶ engine ──▶ KeySink
//!                                      ▲
//!                     Controller ──────┘ (and device commands)
//! ```
//!
//! - The keyer decodes the operator's paddles and echoes characters
//! - The engine re-sends each character as timed DIT-key / DAH-key presses
//! - All engine state lives on one thread; everything else talks to it
//!   through its inbox
//! - Keys are released on every exit path

pub mod config;
pub mod console;
pub mod engine;
pub mod fault;
pub mod keys;
pub mod link;
pub mod log_output;
pub mod logging;
pub mod morse;
pub mod protocol;
pub mod session;
pub mod timing;
pub mod transport;

pub use config::{BridgeConfig, EngineConfig, LinkConfig};
pub use engine::{Engine, EngineInput, EngineState, EngineStats, ExitReason, OverflowPolicy};
pub use fault::{FaultCode, FaultState};
pub use keys::{KeyEmulator, KeySink, KeyingMode, VirtualKey};
pub use link::{CommandSender, Link, LinkError, LinkEvent, LinkReader};
pub use logging::LogStream;
pub use morse::{glyph_for, Element, MorseGlyph};
pub use session::{ControlSurface, Controller, Notification, Session, SessionError, SessionStatus};
pub use timing::{profile_for, SpeedTracker, TimingProfile};
