//! Bridge session: link reader, engine thread and the control handle.
//!
//! # Threads
//!
//! ```text
//! reader ──Echo/Speed/Disconnected──▶ engine inbox ──▶ engine ──▶ KeySink
//!   │                                     ▲
//!   └──▶ SessionShared (status byte)      │ PaddleSwap / KeyingMode / Stop
//!                                         │
//! Controller ──SetWpm / SetMode / sidetone / HostClose──▶ CommandSender
//! ```
//!
//! A session ends on user disconnect or device loss. Keys are up when
//! it ends, and nothing reconnects on its own.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, EngineConfig};
use crate::engine::{engine_inbox, Engine, EngineInput, EngineStats, EngineStatus, ExitReason};
use crate::fault::{FaultCode, FaultSnapshot, FaultState};
use crate::keys::{KeySink, KeyingMode};
use crate::link::{CommandSender, Link, LinkError, LinkEvent, LinkReader, ShutdownHandle};
use crate::logging::LogStream;
use crate::protocol::{Command, ModeRegister, StatusByte};
use crate::timing::{is_plausible, MAX_WPM, MIN_WPM};

/// Notification queue depth; older notifications are not displaced,
/// new ones are dropped when the surface falls behind.
pub const NOTIFY_CAPACITY: usize = 64;

/// Failures of controller requests.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The engine thread has already exited.
    #[error("session has ended")]
    Ended,

    #[error("speed {0} WPM outside {min}..={max}", min = MIN_WPM, max = MAX_WPM)]
    InvalidSpeed(u32),

    #[error("failed to start session thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Event pushed to the control surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Connected { port: String, firmware: u8 },
    /// Character echoed by the keyer.
    Decoded(char),
    /// Pot speed reading in WPM.
    Speed(u32),
    /// Session ended by a fault; keys are up.
    Fault(FaultCode),
    /// Session ended by the user.
    Disconnected,
}

/// State shared between the session threads and the controller.
#[derive(Debug)]
struct SessionShared {
    connected: AtomicBool,
    closing: AtomicBool,
    firmware: u8,
    port: String,
    /// Register written at connect; only the swap bit changes later.
    mode: ModeRegister,
    device_paddle_swap: AtomicBool,
    pot_wpm: AtomicU32,
    speed_override: AtomicU32,
    paddle_swap: AtomicBool,
    straight: AtomicBool,
    last_status: AtomicU8,
    chars_received: AtomicU64,
    fault: FaultState,
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStatus {
    pub connected: bool,
    pub port: String,
    pub firmware: u8,
    /// Last pot reading, 0 before the first one.
    pub pot_wpm: u32,
    pub speed_override: Option<u32>,
    pub paddle_swap: bool,
    /// Swap bit in the keyer's own mode register.
    pub device_paddle_swap: bool,
    pub keying_mode: KeyingMode,
    pub sidetone_muted: bool,
    /// Last status byte, if any was seen.
    pub last_status: Option<StatusByte>,
    pub chars_received: u64,
    pub engine: EngineStats,
    pub fault: FaultSnapshot,
}

/// What a control surface may ask of a running bridge.
pub trait ControlSurface {
    fn disconnect(&self) -> Result<(), SessionError>;
    fn set_paddle_swap(&self, swap: bool) -> Result<(), SessionError>;
    fn set_mute_sidetone(&self, muted: bool) -> Result<(), SessionError>;
    /// `None` hands speed control back to the pot.
    fn set_speed_override(&self, wpm: Option<u32>) -> Result<(), SessionError>;
    fn set_keying_mode(&self, mode: KeyingMode) -> Result<(), SessionError>;
    /// Rewrite the swap bit of the keyer's mode register.
    fn set_device_paddle_swap(&self, swap: bool) -> Result<(), SessionError>;
    fn status(&self) -> SessionStatus;
}

/// Control handle for a running session. Cheap to clone.
#[derive(Clone)]
pub struct Controller {
    commands: CommandSender,
    inbox: Sender<EngineInput>,
    reader: ShutdownHandle,
    shared: Arc<SessionShared>,
    engine: Arc<EngineStatus>,
}

impl Controller {
    fn to_engine(&self, input: EngineInput) -> Result<(), SessionError> {
        self.inbox.send(input).map_err(|_| SessionError::Ended)
    }

    fn write(&self, cmd: Command) -> Result<(), SessionError> {
        self.commands.send(cmd).map_err(|err| {
            if !matches!(err, LinkError::Closed) {
                self.shared.fault.set(FaultCode::Io);
            }
            SessionError::from(err)
        })
    }
}

impl ControlSurface for Controller {
    /// End the session. Calling it again is a no-op.
    fn disconnect(&self) -> Result<(), SessionError> {
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(port = %self.shared.port, "disconnecting");
        let closed = match self.commands.close_session() {
            Ok(()) | Err(LinkError::Closed) => Ok(()),
            Err(err) => Err(SessionError::from(err)),
        };
        self.reader.close();
        // The engine may already be gone after a device loss.
        let _ = self.inbox.send(EngineInput::Stop);
        self.shared.connected.store(false, Ordering::Release);
        closed
    }

    fn set_paddle_swap(&self, swap: bool) -> Result<(), SessionError> {
        self.to_engine(EngineInput::PaddleSwap(swap))?;
        self.shared.paddle_swap.store(swap, Ordering::Relaxed);
        Ok(())
    }

    fn set_mute_sidetone(&self, muted: bool) -> Result<(), SessionError> {
        self.commands.set_sidetone_muted(muted).map_err(|err| {
            if !matches!(err, LinkError::Closed) {
                self.shared.fault.set(FaultCode::Io);
            }
            SessionError::from(err)
        })
    }

    fn set_speed_override(&self, wpm: Option<u32>) -> Result<(), SessionError> {
        if let Some(w) = wpm {
            if !is_plausible(w) {
                return Err(SessionError::InvalidSpeed(w));
            }
        }
        // In range, so it fits the single command byte.
        self.write(Command::SetWpm(wpm.unwrap_or(0) as u8))?;
        self.to_engine(EngineInput::SpeedOverride(wpm))?;
        self.shared.speed_override.store(wpm.unwrap_or(0), Ordering::Relaxed);
        Ok(())
    }

    fn set_keying_mode(&self, mode: KeyingMode) -> Result<(), SessionError> {
        self.to_engine(EngineInput::KeyingMode(mode))?;
        self.shared
            .straight
            .store(mode == KeyingMode::Straight, Ordering::Relaxed);
        Ok(())
    }

    fn set_device_paddle_swap(&self, swap: bool) -> Result<(), SessionError> {
        let mode = self.shared.mode.with_paddle_swap(swap);
        self.write(Command::SetMode(mode))?;
        self.shared.device_paddle_swap.store(swap, Ordering::Relaxed);
        debug!(mode = mode.bits(), "mode register rewritten");
        Ok(())
    }

    fn status(&self) -> SessionStatus {
        let shared = &self.shared;
        let last_status = shared.last_status.load(Ordering::Relaxed);
        let speed_override = shared.speed_override.load(Ordering::Relaxed);
        SessionStatus {
            connected: shared.connected.load(Ordering::Acquire),
            port: shared.port.clone(),
            firmware: shared.firmware,
            pot_wpm: shared.pot_wpm.load(Ordering::Relaxed),
            speed_override: (speed_override != 0).then_some(speed_override),
            paddle_swap: shared.paddle_swap.load(Ordering::Relaxed),
            device_paddle_swap: shared.device_paddle_swap.load(Ordering::Relaxed),
            keying_mode: if shared.straight.load(Ordering::Relaxed) {
                KeyingMode::Straight
            } else {
                KeyingMode::Iambic
            },
            sidetone_muted: self.commands.sidetone_muted(),
            // Status bytes always carry the 0b11 tag, so 0 means none seen.
            last_status: (last_status != 0).then(|| StatusByte::from_bits(last_status)),
            chars_received: shared.chars_received.load(Ordering::Relaxed),
            engine: self.engine.snapshot(),
            fault: shared.fault.snapshot(),
        }
    }
}

/// A running bridge session.
pub struct Session {
    controller: Controller,
    notifications: Receiver<Notification>,
    reader: Option<JoinHandle<()>>,
    engine: Option<JoinHandle<ExitReason>>,
}

impl Session {
    /// Open `port`, handshake and start bridging into `sink`.
    pub fn connect<S>(port: &str, config: &BridgeConfig, sink: S, log: LogStream) -> Result<Self, SessionError>
    where
        S: KeySink + 'static,
    {
        let link = Link::connect(port, &config.link)?;
        Self::start(link, &config.engine, sink, log)
    }

    /// Start bridging over an already handshaken link.
    pub fn start<S>(link: Link, config: &EngineConfig, sink: S, log: LogStream) -> Result<Self, SessionError>
    where
        S: KeySink + 'static,
    {
        let shared = Arc::new(SessionShared {
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            firmware: link.firmware_version(),
            port: link.port().to_string(),
            mode: link.mode_register(),
            device_paddle_swap: AtomicBool::new(link.mode_register().paddle_swap),
            pot_wpm: AtomicU32::new(0),
            speed_override: AtomicU32::new(0),
            paddle_swap: AtomicBool::new(config.paddle_swap),
            straight: AtomicBool::new(config.keying_mode == KeyingMode::Straight),
            last_status: AtomicU8::new(0),
            chars_received: AtomicU64::new(0),
            fault: FaultState::new(),
        });
        let (notify_tx, notifications) = crossbeam_channel::bounded(NOTIFY_CAPACITY);
        let (inbox_tx, inbox_rx) = engine_inbox();

        let (reader, commands) = link.split();
        let reader_handle = reader.shutdown_handle();

        let engine = Engine::new(config, sink, inbox_rx).with_log(log);
        let engine_status = engine.status();
        let engine_thread = engine.spawn().map_err(SessionError::Spawn)?;

        let controller = Controller {
            commands,
            inbox: inbox_tx.clone(),
            reader: reader_handle.clone(),
            shared: Arc::clone(&shared),
            engine: engine_status,
        };

        notify(
            &notify_tx,
            Notification::Connected {
                port: shared.port.clone(),
                firmware: shared.firmware,
            },
        );

        let reader_thread = thread::Builder::new()
            .name("link-reader".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_reader(reader, inbox_tx, notify_tx, shared)
            });
        let reader_thread = match reader_thread {
            Ok(handle) => handle,
            Err(err) => {
                reader_handle.close();
                let _ = controller.inbox.send(EngineInput::Stop);
                let _ = engine_thread.join();
                return Err(SessionError::Spawn(err));
            }
        };

        info!(port = %shared.port, firmware = shared.firmware, "session started");
        Ok(Self {
            controller,
            notifications,
            reader: Some(reader_thread),
            engine: Some(engine_thread),
        })
    }

    /// Handle for control requests from any thread.
    pub fn controller(&self) -> Controller {
        self.controller.clone()
    }

    /// Notifications for the control surface.
    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    /// Wait for the session to end (device loss or disconnect).
    pub fn wait(mut self) -> ExitReason {
        self.join()
    }

    fn join(&mut self) -> ExitReason {
        let reason = match self.engine.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                warn!("engine thread panicked");
                ExitReason::Stopped
            }),
            None => ExitReason::Stopped,
        };
        // The reader notices shutdown within one read timeout.
        self.controller.reader.close();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        self.controller.shared.connected.store(false, Ordering::Release);
        reason
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.engine.is_some() {
            if let Err(err) = self.controller.disconnect() {
                debug!(error = %err, "disconnect on drop");
            }
            self.join();
        }
    }
}

fn notify(tx: &Sender<Notification>, note: Notification) {
    if let Err(TrySendError::Full(note)) = tx.try_send(note) {
        debug!(?note, "notification dropped, surface not keeping up");
    }
}

fn run_reader(
    mut reader: LinkReader,
    inbox: Sender<EngineInput>,
    notify_tx: Sender<Notification>,
    shared: Arc<SessionShared>,
) {
    loop {
        let event = match reader.next_event() {
            Ok(event) => event,
            Err(_) => break,
        };
        match event {
            LinkEvent::Echo(c) => {
                shared.chars_received.fetch_add(1, Ordering::Relaxed);
                notify(&notify_tx, Notification::Decoded(c));
                if inbox.send(EngineInput::Echo(c)).is_err() {
                    break;
                }
            }
            LinkEvent::Speed(wpm) => {
                shared.pot_wpm.store(wpm, Ordering::Relaxed);
                notify(&notify_tx, Notification::Speed(wpm));
                if inbox.send(EngineInput::Speed(wpm)).is_err() {
                    break;
                }
            }
            LinkEvent::Status(status) => {
                debug!(status = status.bits(), "keyer status");
                shared.last_status.store(status.bits(), Ordering::Relaxed);
            }
            LinkEvent::Disconnected => {
                shared.connected.store(false, Ordering::Release);
                let _ = inbox.send(EngineInput::Disconnected);
                if shared.closing.load(Ordering::Acquire) {
                    notify(&notify_tx, Notification::Disconnected);
                } else {
                    warn!(port = %shared.port, "keyer lost");
                    shared.fault.set(FaultCode::Disconnected);
                    notify(&notify_tx, Notification::Fault(FaultCode::Disconnected));
                }
                break;
            }
        }
    }
    debug!(malformed = reader.malformed_count(), "reader exit");
}
