//! Protocol link to the keyer.
//!
//! Owns the serial connection: performs the host-mode handshake, then
//! splits into a [`LinkReader`] (blocking, one classified event per call)
//! and a clonable [`CommandSender`] that may be used from any thread while
//! the reader is blocked.
//!
//! # Lifecycle
//!
//! ```text
//! connect ──▶ handshake ──▶ split ──▶ next_event()* ──▶ Disconnected ──▶ Err(Closed)
//!                                       ▲
//!             CommandSender::close_session() / ShutdownHandle::close()
//! ```

use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::config::LinkConfig;
use crate::protocol::{classify, find_version, Command, Inbound, ModeRegister, PotRange, StatusByte};
use crate::transport::{SerialTransport, Transport};

/// Delay after writing the mode register before further commands.
const MODE_SETTLE: Duration = Duration::from_millis(100);

/// Pause between reads while waiting for the handshake answer.
const HANDSHAKE_POLL: Duration = Duration::from_millis(10);

/// Connection-level failures.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The serial port could not be opened.
    #[error("port {port} unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// The keyer did not acknowledge host mode in time.
    #[error("keyer on {port} did not answer host open within {waited:?}")]
    HandshakeTimeout { port: String, waited: Duration },

    /// The link already reported `Disconnected` or was shut down.
    #[error("link closed")]
    Closed,

    /// Write or setup I/O failed.
    #[error("serial I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// One classified event from the keyer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Character decoded from the paddles.
    Echo(char),
    /// Speed pot reading, already scaled to WPM.
    Speed(u32),
    /// Status byte (diagnostics only).
    Status(StatusByte),
    /// Terminal: the device went away or the link was shut down.
    Disconnected,
}

/// Handshaken connection, not yet split.
pub struct Link {
    port: String,
    transport: Box<dyn Transport>,
    sender: CommandSender,
    firmware: u8,
    pot: PotRange,
    mode: ModeRegister,
}

impl Link {
    /// Open `port` and bring the keyer into host mode.
    pub fn connect(port: &str, config: &LinkConfig) -> Result<Self, LinkError> {
        let transport =
            SerialTransport::open(port, &config.serial).map_err(|source| LinkError::PortUnavailable {
                port: port.to_string(),
                source,
            })?;
        info!(port, baud = config.serial.baud_rate, "serial port open");
        Self::handshake(port, Box::new(transport), config)
    }

    /// Run the host-mode handshake over an already open transport.
    pub fn handshake(
        port: &str,
        mut transport: Box<dyn Transport>,
        config: &LinkConfig,
    ) -> Result<Self, LinkError> {
        thread::sleep(config.settle_delay);

        // Close any session left over from a previous host.
        transport.clear_input()?;
        write_command(transport.as_mut(), Command::HostClose)?;
        thread::sleep(config.reset_delay);
        transport.clear_input()?;

        write_command(transport.as_mut(), Command::HostOpen)?;
        let firmware = wait_for_version(transport.as_mut(), config.handshake_timeout).ok_or_else(|| {
            LinkError::HandshakeTimeout {
                port: port.to_string(),
                waited: config.handshake_timeout,
            }
        })?;
        info!(port, firmware, "keyer in host mode");

        let mode = config.mode_register();
        write_command(transport.as_mut(), Command::SetMode(mode))?;
        debug!(mode = mode.bits(), "mode register written");
        thread::sleep(MODE_SETTLE);

        write_command(transport.as_mut(), Command::SetupSpeedPot(config.pot))?;
        if config.mute_sidetone {
            write_command(transport.as_mut(), Command::sidetone(true))?;
        }
        write_command(transport.as_mut(), Command::GetSpeedPot)?;

        let writer = transport.try_clone_transport()?;
        let sender = CommandSender::new(writer, config.mute_sidetone);

        Ok(Self {
            port: port.to_string(),
            transport,
            sender,
            firmware,
            pot: config.pot,
            mode,
        })
    }

    /// Firmware version reported at host open.
    pub fn firmware_version(&self) -> u8 {
        self.firmware
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Mode register written during the handshake.
    pub fn mode_register(&self) -> ModeRegister {
        self.mode
    }

    /// Split into the read side and the command side.
    pub fn split(self) -> (LinkReader, CommandSender) {
        let reader = LinkReader {
            transport: self.transport,
            pot: self.pot,
            shutdown: Arc::clone(&self.sender.shutdown),
            finished: false,
            malformed: 0,
        };
        (reader, self.sender)
    }
}

fn write_command(transport: &mut dyn Transport, cmd: Command) -> io::Result<()> {
    trace!(?cmd, "tx");
    transport.write_all(&cmd.encode())?;
    transport.flush()
}

fn wait_for_version(transport: &mut dyn Transport, timeout: Duration) -> Option<u8> {
    let deadline = Instant::now() + timeout;
    let mut resp = Vec::new();
    let mut buf = [0u8; 16];

    while Instant::now() < deadline {
        match transport.read(&mut buf) {
            Ok(0) => return None,
            Ok(n) => {
                resp.extend_from_slice(&buf[..n]);
                if let Some(version) = find_version(&resp) {
                    return Some(version);
                }
            }
            Err(e) if is_idle(&e) => thread::sleep(HANDSHAKE_POLL),
            Err(e) => {
                warn!(error = %e, "read failed during handshake");
                return None;
            }
        }
    }
    None
}

#[inline]
fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Read side of the link.
pub struct LinkReader {
    transport: Box<dyn Transport>,
    pot: PotRange,
    shutdown: Arc<AtomicBool>,
    finished: bool,
    malformed: u64,
}

impl LinkReader {
    /// Block until the next classified event.
    ///
    /// Malformed bytes are skipped. Returns `Disconnected` exactly once
    /// (device loss or shutdown), then `Err(LinkError::Closed)`.
    pub fn next_event(&mut self) -> Result<LinkEvent, LinkError> {
        if self.finished {
            return Err(LinkError::Closed);
        }

        let mut byte = [0u8; 1];
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                debug!("reader shut down");
                return Ok(self.finish());
            }

            match self.transport.read(&mut byte) {
                Ok(0) => {
                    warn!("keyer closed the line");
                    return Ok(self.finish());
                }
                Ok(_) => {
                    trace!(byte = byte[0], "rx");
                    match classify(byte[0]) {
                        Inbound::Echo(c) => return Ok(LinkEvent::Echo(c)),
                        Inbound::SpeedPot(b) => return Ok(LinkEvent::Speed(self.pot.wpm(b))),
                        Inbound::Status(s) => return Ok(LinkEvent::Status(s)),
                        Inbound::Malformed(_) => {
                            self.malformed += 1;
                        }
                    }
                }
                Err(e) if is_idle(&e) => {}
                Err(e) => {
                    warn!(error = %e, "serial read failed");
                    return Ok(self.finish());
                }
            }
        }
    }

    fn finish(&mut self) -> LinkEvent {
        self.finished = true;
        self.shutdown.store(true, Ordering::Release);
        LinkEvent::Disconnected
    }

    /// Handle that ends a blocked `next_event` within one read timeout.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Bytes discarded as malformed.
    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }
}

/// Requests reader shutdown from another thread.
#[derive(Clone, Debug)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Command side of the link.
///
/// Cheap to clone; writes are serialized on an internal mutex and never
/// touch the reader's handle.
#[derive(Clone)]
pub struct CommandSender {
    writer: Arc<Mutex<Box<dyn Transport>>>,
    sidetone_muted: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl CommandSender {
    fn new(writer: Box<dyn Transport>, sidetone_muted: bool) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            sidetone_muted: Arc::new(AtomicBool::new(sidetone_muted)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Write one command.
    pub fn send(&self, cmd: Command) -> Result<(), LinkError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        write_command(writer.as_mut(), cmd)?;
        Ok(())
    }

    /// Mute or restore the keyer's sidetone.
    pub fn set_sidetone_muted(&self, muted: bool) -> Result<(), LinkError> {
        self.send(Command::sidetone(muted))?;
        self.sidetone_muted.store(muted, Ordering::Relaxed);
        Ok(())
    }

    pub fn sidetone_muted(&self) -> bool {
        self.sidetone_muted.load(Ordering::Relaxed)
    }

    /// Leave host mode: restore sidetone if muted, HostClose, and stop
    /// the reader.
    pub fn close_session(&self) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let restored = if self.sidetone_muted() {
            self.send(Command::sidetone(false))
        } else {
            Ok(())
        };
        let closed = self.send(Command::HostClose);
        self.shutdown.store(true, Ordering::Release);
        restored.and(closed)
    }

    /// Whether the link has been shut down from either side.
    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
