//! WinKeyer host-mode wire protocol.
//!
//! Outbound: a handful of one to four byte commands.
//! Inbound: a single-byte stream where the top two bits select the class:
//!
//! ```text
//! 11xx_xxxx  status byte
//! 10xx_xxxx  speed pot reading
//! 0xxx_xxxx  echoed ASCII (printable range only)
//! ```

/// Admin command prefix.
pub const CMD_ADMIN: u8 = 0x00;
/// Admin sub-command: open host session.
pub const ADMIN_HOST_OPEN: u8 = 0x02;
/// Admin sub-command: close host session.
pub const ADMIN_HOST_CLOSE: u8 = 0x03;
/// Sidetone control.
pub const CMD_SIDETONE: u8 = 0x01;
/// Host speed override (0 = follow pot).
pub const CMD_SET_WPM: u8 = 0x02;
/// Speed pot range setup.
pub const CMD_SETUP_POT: u8 = 0x05;
/// Request a pot reading.
pub const CMD_GET_POT: u8 = 0x07;
/// Write the mode register.
pub const CMD_SET_MODE: u8 = 0x0E;

/// Sidetone parameter that silences the keyer's own tone.
pub const SIDETONE_MUTED: u8 = 0x00;
/// Sidetone parameter restored on unmute (4000 / 4 = 1000 Hz).
pub const SIDETONE_1000HZ: u8 = 0x04;

/// Lowest firmware version byte accepted as a host-open answer.
pub const VERSION_MIN: u8 = 0x10;
/// Highest firmware version byte accepted as a host-open answer.
pub const VERSION_MAX: u8 = 0x40;

/// Keyer paddle mode (mode register bits 5..4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyMode {
    #[default]
    IambicB,
    IambicA,
    Ultimatic,
    Bug,
}

impl KeyMode {
    const fn bits(self) -> u8 {
        match self {
            KeyMode::IambicB => 0b00,
            KeyMode::IambicA => 0b01,
            KeyMode::Ultimatic => 0b10,
            KeyMode::Bug => 0b11,
        }
    }
}

/// WinKeyer mode register.
///
/// Bit layout:
/// - Bit 7: paddle watchdog disable
/// - Bit 6: paddle echo
/// - Bits 5-4: key mode
/// - Bit 3: paddle swap
/// - Bit 2: serial echo
/// - Bit 1: autospace
/// - Bit 0: contest spacing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeRegister {
    pub watchdog_disable: bool,
    pub paddle_echo: bool,
    pub key_mode: KeyMode,
    pub paddle_swap: bool,
    pub serial_echo: bool,
    pub autospace: bool,
    pub contest_spacing: bool,
}

impl Default for ModeRegister {
    /// Watchdog off, paddle echo, iambic B, serial echo, autospace.
    fn default() -> Self {
        Self {
            watchdog_disable: true,
            paddle_echo: true,
            key_mode: KeyMode::IambicB,
            paddle_swap: false,
            serial_echo: true,
            autospace: true,
            contest_spacing: false,
        }
    }
}

impl ModeRegister {
    /// Encode as the raw register byte.
    pub const fn bits(&self) -> u8 {
        (self.watchdog_disable as u8) << 7
            | (self.paddle_echo as u8) << 6
            | self.key_mode.bits() << 4
            | (self.paddle_swap as u8) << 3
            | (self.serial_echo as u8) << 2
            | (self.autospace as u8) << 1
            | self.contest_spacing as u8
    }

    /// Same register with the paddle swap bit changed.
    pub const fn with_paddle_swap(mut self, swap: bool) -> Self {
        self.paddle_swap = swap;
        self
    }
}

/// Speed pot scaling.
///
/// The keyer reports the pot as a 5-bit position; it is spread linearly
/// over `min_wpm..=min_wpm + range_wpm`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PotRange {
    pub min_wpm: u8,
    pub range_wpm: u8,
}

impl Default for PotRange {
    fn default() -> Self {
        Self {
            min_wpm: 10,
            range_wpm: 20,
        }
    }
}

impl PotRange {
    /// Full-scale pot position.
    pub const FULL_SCALE: u32 = 31;

    /// Convert a pot byte to WPM.
    #[inline]
    pub fn wpm(&self, pot_byte: u8) -> u32 {
        let position = (pot_byte & 0x1F) as u32;
        self.min_wpm as u32 + position * self.range_wpm as u32 / Self::FULL_SCALE
    }
}

/// Host to keyer command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    HostOpen,
    HostClose,
    SetSidetone(u8),
    SetWpm(u8),
    SetupSpeedPot(PotRange),
    GetSpeedPot,
    SetMode(ModeRegister),
}

impl Command {
    /// Sidetone mute/unmute helper.
    pub const fn sidetone(muted: bool) -> Self {
        if muted {
            Command::SetSidetone(SIDETONE_MUTED)
        } else {
            Command::SetSidetone(SIDETONE_1000HZ)
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Command::HostOpen => vec![CMD_ADMIN, ADMIN_HOST_OPEN],
            Command::HostClose => vec![CMD_ADMIN, ADMIN_HOST_CLOSE],
            Command::SetSidetone(v) => vec![CMD_SIDETONE, v],
            Command::SetWpm(wpm) => vec![CMD_SET_WPM, wpm],
            Command::SetupSpeedPot(range) => {
                vec![CMD_SETUP_POT, range.min_wpm, range.range_wpm, 0x00]
            }
            Command::GetSpeedPot => vec![CMD_GET_POT],
            Command::SetMode(mode) => vec![CMD_SET_MODE, mode.bits()],
        }
    }
}

/// Keyer status byte (`11xx_xxxx`).
///
/// Bit layout:
/// - Bit 4: WAIT
/// - Bit 3: KEYDOWN
/// - Bit 2: BUSY
/// - Bit 1: BREAKIN (paddle active)
/// - Bit 0: XOFF
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusByte(u8);

impl StatusByte {
    pub const XOFF: u8 = 0x01;
    pub const BREAKIN: u8 = 0x02;
    pub const BUSY: u8 = 0x04;
    pub const KEYDOWN: u8 = 0x08;
    pub const WAIT: u8 = 0x10;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn xoff(&self) -> bool {
        self.0 & Self::XOFF != 0
    }

    /// Paddles are being worked.
    pub const fn break_in(&self) -> bool {
        self.0 & Self::BREAKIN != 0
    }

    pub const fn busy(&self) -> bool {
        self.0 & Self::BUSY != 0
    }

    pub const fn key_down(&self) -> bool {
        self.0 & Self::KEYDOWN != 0
    }

    pub const fn wait(&self) -> bool {
        self.0 & Self::WAIT != 0
    }
}

/// Classified inbound byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Character the keyer decoded from the paddles.
    Echo(char),
    /// Raw pot byte; scale with [`PotRange::wpm`].
    SpeedPot(u8),
    Status(StatusByte),
    /// Control byte outside every class; discarded by the link.
    Malformed(u8),
}

#[inline]
pub const fn is_status_byte(b: u8) -> bool {
    b & 0xC0 == 0xC0
}

#[inline]
pub const fn is_pot_byte(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Classify one inbound byte.
pub fn classify(b: u8) -> Inbound {
    if is_status_byte(b) {
        Inbound::Status(StatusByte(b))
    } else if is_pot_byte(b) {
        Inbound::SpeedPot(b)
    } else if (0x20..=0x7E).contains(&b) {
        Inbound::Echo((b as char).to_ascii_uppercase())
    } else {
        Inbound::Malformed(b)
    }
}

/// Find the firmware version in a host-open answer.
///
/// Prefers a version byte following an admin echo (`00 vv`); otherwise
/// accepts a trailing in-range byte.
pub fn find_version(resp: &[u8]) -> Option<u8> {
    let in_range = |b: u8| (VERSION_MIN..=VERSION_MAX).contains(&b);
    resp.windows(2)
        .find(|w| w[0] == 0x00 && in_range(w[1]))
        .map(|w| w[1])
        .or_else(|| resp.last().copied().filter(|b| in_range(*b)))
}
