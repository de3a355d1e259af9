//! Module: config
//!
//! Purpose: Bridge configuration with documented defaults.
//!
//! Architecture:
//! - `LinkConfig`: serial framing, handshake windows, device-side setup
//! - `EngineConfig`: queue sizing and initial keying flags
//! - Runtime changes after connect go through `session::Controller`,
//!   never through these structs
//!
//! Persistence of preferences belongs to the host application.

use std::time::Duration;

use crate::engine::OverflowPolicy;
use crate::keys::KeyingMode;
use crate::protocol::{KeyMode, ModeRegister, PotRange};
use crate::timing::DEFAULT_WPM;
use crate::transport::SerialSettings;

/// Protocol link configuration.
#[derive(Clone, Copy, Debug)]
pub struct LinkConfig {
    pub serial: SerialSettings,

    /// Wait after opening the port before talking to the keyer.
    pub settle_delay: Duration,

    /// Wait after HostClose for the keyer to reset.
    pub reset_delay: Duration,

    /// How long to wait for the host-open version byte.
    pub handshake_timeout: Duration,

    /// Silence the keyer's own sidetone while bridged.
    pub mute_sidetone: bool,

    /// Paddle swap bit written to the keyer's mode register. Changes
    /// which characters the keyer echoes; on by default.
    pub device_paddle_swap: bool,

    /// Paddle mode written to the keyer's mode register.
    pub key_mode: KeyMode,

    /// Pot scaling sent with SetupSpeedPot and used to decode pot bytes.
    pub pot: PotRange,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            settle_delay: Duration::from_millis(500),
            reset_delay: Duration::from_millis(1000),
            handshake_timeout: Duration::from_millis(1000),
            mute_sidetone: true,
            device_paddle_swap: true,
            key_mode: KeyMode::IambicB,
            pot: PotRange::default(),
        }
    }
}

impl LinkConfig {
    /// Mode register value written at connect.
    pub fn mode_register(&self) -> ModeRegister {
        ModeRegister {
            key_mode: self.key_mode,
            ..ModeRegister::default()
        }
        .with_paddle_swap(self.device_paddle_swap)
    }
}

/// Decode-and-synthesize engine configuration.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Speed assumed until the keyer reports one.
    pub initial_wpm: u32,

    /// Pending character capacity.
    pub queue_capacity: usize,

    /// What to drop when the queue is full.
    pub overflow: OverflowPolicy,

    /// Swap DIT-key and DAH-key.
    pub paddle_swap: bool,

    pub keying_mode: KeyingMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_wpm: DEFAULT_WPM,
            queue_capacity: 64,
            overflow: OverflowPolicy::DropNewest,
            paddle_swap: false,
            keying_mode: KeyingMode::Iambic,
        }
    }
}

impl EngineConfig {
    /// Config for given WPM with default settings.
    pub fn with_wpm(wpm: u32) -> Self {
        Self {
            initial_wpm: wpm,
            ..Default::default()
        }
    }
}

/// Everything needed to start a session.
#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeConfig {
    pub link: LinkConfig,
    pub engine: EngineConfig,
}
