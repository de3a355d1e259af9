//! In-memory keyer for link and session tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rust_wk_bridge::config::LinkConfig;
use rust_wk_bridge::transport::Transport;

#[derive(Default)]
struct KeyerState {
    rx: VecDeque<u8>,
    written: Vec<u8>,
    /// Byte answered to HostOpen, if any.
    version: Option<u8>,
    gone: bool,
}

/// Fake keyer line. Clones share the same state, like a cloned port.
#[derive(Clone, Default)]
pub struct FakeKeyer {
    state: Arc<Mutex<KeyerState>>,
}

impl FakeKeyer {
    /// Keyer that answers host open with `version`.
    pub fn answering(version: u8) -> Self {
        let keyer = Self::default();
        keyer.state.lock().unwrap().version = Some(version);
        keyer
    }

    /// Keyer that never answers.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Queue bytes as if the keyer sent them.
    pub fn feed(&self, bytes: &[u8]) {
        self.state.lock().unwrap().rx.extend(bytes.iter().copied());
    }

    /// Simulate unplugging the keyer.
    pub fn unplug(&self) {
        self.state.lock().unwrap().gone = true;
    }

    /// Everything the host wrote so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }
}

impl Read for FakeKeyer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.state.lock().unwrap();
            if !state.rx.is_empty() {
                let n = buf.len().min(state.rx.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = state.rx.pop_front().unwrap();
                }
                return Ok(n);
            }
            if state.gone {
                return Ok(0);
            }
        }
        thread::sleep(Duration::from_millis(2));
        Err(io::Error::new(ErrorKind::TimedOut, "idle"))
    }
}

impl Write for FakeKeyer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.gone {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged"));
        }
        state.written.extend_from_slice(buf);
        if buf == [0x00, 0x02] {
            if let Some(version) = state.version {
                state.rx.push_back(version);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for FakeKeyer {
    fn clear_input(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().rx.clear();
        Ok(())
    }

    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(self.clone()))
    }
}

/// Link config without the real-hardware settle delays.
pub fn fast_link_config() -> LinkConfig {
    LinkConfig {
        settle_delay: Duration::ZERO,
        reset_delay: Duration::ZERO,
        handshake_timeout: Duration::from_millis(200),
        ..LinkConfig::default()
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
