//! Decode-and-synthesize engine.
//!
//! Turns echoed characters into timed presses and releases of the two
//! virtual keys.
//!
//! # States
//!
//! ```text
//!            echo (glyph found)
//!   Idle ───────────────────────▶ Emitting ──last element──▶ Draining
//!    ▲                              │  press / hold / release     │
//!    │                              │  element gap between        │ char gap
//!    └──────────────────────────────┴─────────────────────────────┘
//!            Disconnected / Stop from any state: keys up, queue cleared
//! ```
//!
//! All engine state lives on the engine thread. Other threads talk to it
//! only through the inbox channel. Every hold is a deadline receive on
//! that channel, so a disconnect or stop is seen mid-element rather than
//! after the character finishes.
//!
//! Speed, swap and keying mode are snapshotted when a character starts;
//! changes received while it is in flight apply from the next character.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::EngineConfig;
use crate::keys::{KeyEmulator, KeyMap, KeySink, KeyingMode};
use crate::logging::{log_stream, LogStream};
use crate::morse::{glyph_for, pattern};
use crate::timing::{profile_for, SpeedTracker, TimingProfile};
use crate::{rt_debug, rt_info, rt_trace, rt_warn};

/// Inbox depth. The reader blocks when the engine falls this far behind
/// on message handling (not on emission; echoes move to the pending
/// queue as soon as they are received).
pub const INBOX_CAPACITY: usize = 256;

/// Message into the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineInput {
    /// Character echoed by the keyer.
    Echo(char),
    /// Speed pot reading in WPM.
    Speed(u32),
    /// Host speed override; `None` (or `Some(0)`) follows the pot again.
    SpeedOverride(Option<u32>),
    PaddleSwap(bool),
    KeyingMode(KeyingMode),
    /// The link is gone: release keys and stop now.
    Disconnected,
    /// Local stop request: release keys and stop now.
    Stop,
}

/// Create the engine inbox.
pub fn engine_inbox() -> (Sender<EngineInput>, Receiver<EngineInput>) {
    crossbeam_channel::bounded(INBOX_CAPACITY)
}

/// What to drop when the pending queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep what is queued, discard the arriving character.
    #[default]
    DropNewest,
    /// Discard the oldest queued character to make room.
    DropOldest,
}

/// Bounded FIFO of characters waiting for emission.
#[derive(Debug)]
pub struct PendingQueue {
    buf: VecDeque<char>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl PendingQueue {
    /// Capacity is at least one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Enqueue `c`. Returns the character discarded by the overflow
    /// policy, if any.
    pub fn push(&mut self, c: char) -> Option<char> {
        if self.buf.len() < self.capacity {
            self.buf.push_back(c);
            return None;
        }
        match self.policy {
            OverflowPolicy::DropNewest => Some(c),
            OverflowPolicy::DropOldest => {
                let oldest = self.buf.pop_front();
                self.buf.push_back(c);
                oldest
            }
        }
    }

    pub fn pop(&mut self) -> Option<char> {
        self.buf.pop_front()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Engine state machine state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Emitting = 1,
    Draining = 2,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Emitting,
            2 => EngineState::Draining,
            _ => EngineState::Idle,
        }
    }
}

/// Why [`Engine::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// `EngineInput::Disconnected` received.
    Disconnected,
    /// `EngineInput::Stop` received.
    Stopped,
    /// Every inbox sender dropped; queued characters were finished first.
    InputClosed,
}

/// Live counters, readable from any thread.
#[derive(Debug)]
pub struct EngineStatus {
    state: AtomicU8,
    wpm: AtomicU32,
    queued: AtomicU32,
    emitted: AtomicU64,
    skipped: AtomicU64,
    overflows: AtomicU64,
    speed_noise: AtomicU64,
}

impl EngineStatus {
    fn new(wpm: u32) -> Self {
        Self {
            state: AtomicU8::new(EngineState::Idle as u8),
            wpm: AtomicU32::new(wpm),
            queued: AtomicU32::new(0),
            emitted: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            speed_noise: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Speed the next character will use.
    pub fn wpm(&self) -> u32 {
        self.wpm.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            state: self.state(),
            wpm: self.wpm(),
            queued: self.queued.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            speed_noise: self.speed_noise.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`EngineStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStats {
    pub state: EngineState,
    pub wpm: u32,
    /// Characters waiting in the pending queue.
    pub queued: u32,
    /// Characters fully emitted.
    pub emitted: u64,
    /// Echoes with no glyph.
    pub skipped: u64,
    /// Characters lost to queue overflow.
    pub overflows: u64,
    /// Speed readings rejected as implausible.
    pub speed_noise: u64,
}

/// Interruption raised inside a hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Halt {
    Disconnected,
    Stopped,
}

/// The decode-and-synthesize engine.
pub struct Engine<S: KeySink> {
    inbox: Receiver<EngineInput>,
    inbox_open: bool,
    keys: KeyEmulator<S>,
    queue: PendingQueue,
    speed: SpeedTracker,
    speed_override: Option<TimingProfile>,
    key_map: KeyMap,
    status: Arc<EngineStatus>,
    log: LogStream,
}

impl<S: KeySink> Engine<S> {
    pub fn new(config: &EngineConfig, sink: S, inbox: Receiver<EngineInput>) -> Self {
        let speed = SpeedTracker::new(config.initial_wpm);
        // Without `with_log` entries go nowhere.
        let (log, _) = log_stream(1);
        Self {
            inbox,
            inbox_open: true,
            keys: KeyEmulator::new(sink),
            queue: PendingQueue::new(config.queue_capacity, config.overflow),
            speed,
            speed_override: None,
            key_map: KeyMap::new(config.keying_mode, config.paddle_swap),
            status: Arc::new(EngineStatus::new(speed.current().wpm)),
            log,
        }
    }

    /// Route engine logs into `log`.
    pub fn with_log(mut self, log: LogStream) -> Self {
        self.log = log;
        self
    }

    /// Shared live counters.
    pub fn status(&self) -> Arc<EngineStatus> {
        Arc::clone(&self.status)
    }

    /// Profile the next character will snapshot.
    pub fn active_profile(&self) -> TimingProfile {
        self.speed_override.unwrap_or_else(|| self.speed.current())
    }

    /// Run until disconnected, stopped, or the inbox closes.
    ///
    /// Keys are always up when this returns.
    pub fn run(&mut self) -> ExitReason {
        rt_info!(self.log, "engine start @ {} wpm", self.active_profile().wpm);

        let reason = loop {
            let next = match self.queue.pop() {
                Some(c) => {
                    self.publish_queue();
                    c
                }
                None if !self.inbox_open => break ExitReason::InputClosed,
                None => {
                    match self.inbox.recv() {
                        Ok(input) => {
                            if let Err(halt) = self.handle(input) {
                                break halt.into();
                            }
                        }
                        Err(_) => self.inbox_open = false,
                    }
                    continue;
                }
            };

            if let Err(halt) = self.emit(next) {
                break halt.into();
            }
        };

        self.keys.release_all();
        self.queue.clear();
        self.publish_queue();
        self.set_state(EngineState::Idle);
        rt_info!(self.log, "engine exit: {:?}", reason);
        reason
    }

    /// Run on a dedicated thread.
    pub fn spawn(mut self) -> io::Result<JoinHandle<ExitReason>>
    where
        S: 'static,
    {
        thread::Builder::new()
            .name("engine".into())
            .spawn(move || self.run())
    }

    // --- Private methods ---

    fn handle(&mut self, input: EngineInput) -> Result<(), Halt> {
        match input {
            EngineInput::Echo(c) => self.enqueue(c),
            EngineInput::Speed(wpm) => self.observe_speed(wpm),
            EngineInput::SpeedOverride(wpm) => {
                self.speed_override = wpm.filter(|w| *w != 0).map(profile_for);
                rt_info!(self.log, "speed override {:?}", self.speed_override.map(|p| p.wpm));
                self.publish_wpm();
            }
            EngineInput::PaddleSwap(swap) => {
                self.key_map.swapped = swap;
                rt_info!(self.log, "paddle swap {}", swap);
            }
            EngineInput::KeyingMode(mode) => {
                self.key_map.mode = mode;
                rt_info!(self.log, "keying mode {:?}", mode);
            }
            EngineInput::Disconnected => return Err(Halt::Disconnected),
            EngineInput::Stop => return Err(Halt::Stopped),
        }
        Ok(())
    }

    fn enqueue(&mut self, c: char) {
        if c.is_whitespace() {
            // Word spacing is not reproduced.
            return;
        }
        if glyph_for(c).is_none() {
            self.status.skipped.fetch_add(1, Ordering::Relaxed);
            rt_debug!(self.log, "no glyph for {:?}, skipped", c);
            return;
        }
        if let Some(lost) = self.queue.push(c) {
            self.status.overflows.fetch_add(1, Ordering::Relaxed);
            rt_warn!(self.log, "pending queue full, dropped {:?}", lost);
        }
        self.publish_queue();
    }

    fn observe_speed(&mut self, wpm: u32) {
        match self.speed.observe(wpm) {
            Ok(profile) => {
                rt_debug!(self.log, "speed {} wpm", profile.wpm);
                self.publish_wpm();
            }
            Err(noise) => {
                self.status.speed_noise.fetch_add(1, Ordering::Relaxed);
                rt_debug!(self.log, "{}", noise);
            }
        }
    }

    fn emit(&mut self, c: char) -> Result<(), Halt> {
        let Some(glyph) = glyph_for(c) else {
            return Ok(());
        };
        let profile = self.active_profile();
        let map = self.key_map;

        self.set_state(EngineState::Emitting);
        rt_debug!(self.log, "emit {} {} @ {} wpm", c, pattern(glyph), profile.wpm);

        for (i, &element) in glyph.iter().enumerate() {
            let key = map.key_for(element);
            self.keys.press(key);
            rt_trace!(self.log, "{} down", key);
            let held = self.hold(profile.duration(element));
            self.keys.release(key);
            held?;

            if i + 1 < glyph.len() {
                self.hold(profile.element_gap)?;
            }
        }

        self.set_state(EngineState::Draining);
        self.hold(profile.char_gap)?;

        self.status.emitted.fetch_add(1, Ordering::Relaxed);
        self.set_state(EngineState::Idle);
        Ok(())
    }

    /// Wait `duration`, servicing the inbox meanwhile.
    fn hold(&mut self, duration: Duration) -> Result<(), Halt> {
        let deadline = Instant::now() + duration;
        loop {
            if !self.inbox_open {
                let now = Instant::now();
                if now < deadline {
                    thread::sleep(deadline - now);
                }
                return Ok(());
            }
            match self.inbox.recv_deadline(deadline) {
                Ok(input) => self.handle(input)?,
                Err(RecvTimeoutError::Timeout) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => self.inbox_open = false,
            }
        }
    }

    fn set_state(&self, state: EngineState) {
        self.status.state.store(state as u8, Ordering::Release);
    }

    fn publish_queue(&self) {
        self.status.queued.store(self.queue.len() as u32, Ordering::Relaxed);
    }

    fn publish_wpm(&self) {
        self.status.wpm.store(self.active_profile().wpm, Ordering::Relaxed);
    }
}

impl From<Halt> for ExitReason {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::Disconnected => ExitReason::Disconnected,
            Halt::Stopped => ExitReason::Stopped,
        }
    }
}
