//! Timing model: words per minute to element durations.
//!
//! PARIS timing: dit = 1.2 / WPM seconds. All other durations are whole
//! multiples of the dit so the 1:3:1:3 ratios hold exactly.

use core::time::Duration;

use crate::morse::Element;

/// Speed used before the keyer has reported one.
pub const DEFAULT_WPM: u32 = 20;

/// Slowest plausible pot reading.
pub const MIN_WPM: u32 = 5;

/// Fastest plausible pot reading.
pub const MAX_WPM: u32 = 60;

/// Nanoseconds in one dit at 1 WPM.
const DIT_NS_AT_1_WPM: u64 = 1_200_000_000;

/// Element and spacing durations for one speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingProfile {
    /// Speed this profile was derived from.
    pub wpm: u32,
    /// Mark length of a dit.
    pub dit: Duration,
    /// Mark length of a dah (3 dits).
    pub dah: Duration,
    /// Space between elements of one character (1 dit).
    pub element_gap: Duration,
    /// Space after the last element of a character (3 dits).
    pub char_gap: Duration,
}

impl TimingProfile {
    fn from_valid_wpm(wpm: u32) -> Self {
        let dit = Duration::from_nanos(DIT_NS_AT_1_WPM / wpm as u64);
        Self {
            wpm,
            dit,
            dah: dit * 3,
            element_gap: dit,
            char_gap: dit * 3,
        }
    }

    /// Mark duration for an element.
    #[inline]
    pub fn duration(&self, element: Element) -> Duration {
        match element {
            Element::Dit => self.dit,
            Element::Dah => self.dah,
        }
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::from_valid_wpm(DEFAULT_WPM)
    }
}

/// Whether a reading is inside the accepted speed range.
#[inline]
pub fn is_plausible(wpm: u32) -> bool {
    (MIN_WPM..=MAX_WPM).contains(&wpm)
}

/// Derive a profile for a speed.
///
/// `0` means "no reading yet" and yields the [`DEFAULT_WPM`] profile.
/// Anything else is clamped into `MIN_WPM..=MAX_WPM`.
pub fn profile_for(wpm: u32) -> TimingProfile {
    if wpm == 0 {
        return TimingProfile::default();
    }
    TimingProfile::from_valid_wpm(wpm.clamp(MIN_WPM, MAX_WPM))
}

/// A speed reading outside the plausible range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("speed reading {wpm} WPM outside {min}..={max}, ignored", min = MIN_WPM, max = MAX_WPM)]
pub struct TimingNoise {
    pub wpm: u32,
}

/// Tracks the active profile across speed readings.
///
/// Implausible readings are rejected and the previous profile kept.
#[derive(Clone, Copy, Debug)]
pub struct SpeedTracker {
    current: TimingProfile,
    rejected: u32,
}

impl SpeedTracker {
    /// Start at the given speed (`0` selects the default).
    pub fn new(initial_wpm: u32) -> Self {
        Self {
            current: profile_for(initial_wpm),
            rejected: 0,
        }
    }

    /// Feed a reading. Returns the new profile when accepted.
    pub fn observe(&mut self, wpm: u32) -> Result<TimingProfile, TimingNoise> {
        if !is_plausible(wpm) {
            self.rejected = self.rejected.saturating_add(1);
            return Err(TimingNoise { wpm });
        }
        self.current = TimingProfile::from_valid_wpm(wpm);
        Ok(self.current)
    }

    /// Profile currently in force.
    #[inline]
    pub fn current(&self) -> TimingProfile {
        self.current
    }

    /// Number of readings rejected as noise.
    #[inline]
    pub fn rejected(&self) -> u32 {
        self.rejected
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WPM)
    }
}
