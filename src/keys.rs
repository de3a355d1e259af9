//! Key emulator: the side-effecting boundary to OS key injection.
//!
//! Two logical keys, DIT-key and DAH-key. The emulator tracks whether
//! each is held so that:
//! - a press never overlaps a hold of the other key
//! - `release_all()` is always safe and idempotent
//! - dropping the emulator never leaves a key down

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::debug;

use crate::morse::Element;

/// Logical virtual key watched by the remote service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VirtualKey {
    Dit,
    Dah,
}

impl VirtualKey {
    /// The other key.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            VirtualKey::Dit => VirtualKey::Dah,
            VirtualKey::Dah => VirtualKey::Dit,
        }
    }

    #[inline]
    const fn index(self) -> usize {
        match self {
            VirtualKey::Dit => 0,
            VirtualKey::Dah => 1,
        }
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualKey::Dit => f.write_str("DIT-key"),
            VirtualKey::Dah => f.write_str("DAH-key"),
        }
    }
}

/// How elements map onto the virtual keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyingMode {
    /// Dits on DIT-key, dahs on DAH-key (remote set to iambic).
    #[default]
    Iambic,
    /// Every element on one key, held for the element length
    /// (remote set to straight key).
    Straight,
}

/// Element to key mapping, snapshotted once per character.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct KeyMap {
    pub mode: KeyingMode,
    pub swapped: bool,
}

impl KeyMap {
    pub const fn new(mode: KeyingMode, swapped: bool) -> Self {
        Self { mode, swapped }
    }

    /// Key that carries `element`.
    pub fn key_for(&self, element: Element) -> VirtualKey {
        let key = match (self.mode, element) {
            (KeyingMode::Straight, _) => VirtualKey::Dit,
            (KeyingMode::Iambic, Element::Dit) => VirtualKey::Dit,
            (KeyingMode::Iambic, Element::Dah) => VirtualKey::Dah,
        };
        if self.swapped {
            key.other()
        } else {
            key
        }
    }
}

/// OS key injection primitive.
///
/// Assumed reliable: a call either takes effect or the process is in no
/// state to recover anyway.
pub trait KeySink: Send {
    fn key_down(&mut self, key: VirtualKey);
    fn key_up(&mut self, key: VirtualKey);
}

impl<S: KeySink + ?Sized> KeySink for Box<S> {
    fn key_down(&mut self, key: VirtualKey) {
        (**self).key_down(key)
    }

    fn key_up(&mut self, key: VirtualKey) {
        (**self).key_up(key)
    }
}

/// Per-key hold state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyState {
    pub held: bool,
    pub last_transition: Option<Instant>,
}

/// Tracks and drives the two virtual keys.
pub struct KeyEmulator<S: KeySink> {
    sink: S,
    keys: [KeyState; 2],
}

impl<S: KeySink> KeyEmulator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            keys: [KeyState::default(); 2],
        }
    }

    /// Press `key`. Releases the other key first if it is held.
    /// No-op if `key` is already held.
    pub fn press(&mut self, key: VirtualKey) {
        if self.is_held(key.other()) {
            self.release(key.other());
        }
        if self.is_held(key) {
            return;
        }
        let state = &mut self.keys[key.index()];
        self.sink.key_down(key);
        state.held = true;
        state.last_transition = Some(Instant::now());
    }

    /// Release `key`. No-op if it is not held.
    pub fn release(&mut self, key: VirtualKey) {
        if !self.is_held(key) {
            return;
        }
        let state = &mut self.keys[key.index()];
        self.sink.key_up(key);
        state.held = false;
        state.last_transition = Some(Instant::now());
    }

    /// Release every held key. Idempotent.
    pub fn release_all(&mut self) {
        if !self.any_held() {
            return;
        }
        for key in [VirtualKey::Dit, VirtualKey::Dah] {
            if self.is_held(key) {
                self.release(key);
                debug!(%key, "forced key release");
            }
        }
    }

    pub fn state(&self, key: VirtualKey) -> KeyState {
        self.keys[key.index()]
    }

    pub fn is_held(&self, key: VirtualKey) -> bool {
        self.keys[key.index()].held
    }

    pub fn any_held(&self) -> bool {
        self.keys.iter().any(|k| k.held)
    }
}

impl<S: KeySink> Drop for KeyEmulator<S> {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// One recorded key edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub key: VirtualKey,
    pub down: bool,
    pub at: Instant,
}

/// Sink that records every edge; clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<Transition>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all edges so far.
    pub fn transitions(&self) -> Vec<Transition> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, key: VirtualKey, down: bool) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Transition {
                key,
                down,
                at: Instant::now(),
            });
    }
}

impl KeySink for RecordingSink {
    fn key_down(&mut self, key: VirtualKey) {
        self.push(key, true);
    }

    fn key_up(&mut self, key: VirtualKey) {
        self.push(key, false);
    }
}

/// Sink that only logs edges (dry run, no injection).
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl KeySink for TracingSink {
    fn key_down(&mut self, key: VirtualKey) {
        tracing::info!(%key, "down");
    }

    fn key_up(&mut self, key: VirtualKey) {
        tracing::info!(%key, "up");
    }
}
