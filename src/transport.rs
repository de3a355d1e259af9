//! Byte transport under the protocol link.
//!
//! The link talks to a [`Transport`] so the handshake and read loop run
//! against real serial ports and in-memory fakes alike.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortType, StopBits};

/// Bidirectional byte channel to the keyer.
///
/// Reads must return within a bounded time: an idle line yields
/// `ErrorKind::TimedOut` (or `WouldBlock`), never an indefinite block.
/// `Ok(0)` means the device went away.
pub trait Transport: Read + Write + Send {
    /// Discard unread input.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Independent handle to the same device, used as the command writer.
    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>>;
}

/// Serial line parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 1200,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// Serial port transport (1200 8N2).
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port with the keyer's fixed framing.
    pub fn open(path: &str, settings: &SerialSettings) -> serialport::Result<Self> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .timeout(settings.read_timeout)
            .open()?;
        Ok(Self { port })
    }

    /// Name of the underlying port, if known.
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn try_clone_transport(&self) -> io::Result<Box<dyn Transport>> {
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(SerialTransport { port }))
    }
}

/// Serial port found on the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: Option<String>,
}

impl PortInfo {
    /// Adapter chips keyers usually ship with.
    fn looks_like_keyer(&self) -> bool {
        self.description
            .as_deref()
            .map(|d| ["FTDI", "WinKey", "CH340"].iter().any(|tag| d.contains(tag)))
            .unwrap_or(false)
    }
}

/// List serial ports.
pub fn available_ports() -> serialport::Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(usb) => usb.product.or(usb.manufacturer),
                _ => None,
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}

/// Pick the port most likely to be a keyer: first adapter with a known
/// description, else the first port.
pub fn suggest_port(ports: &[PortInfo]) -> Option<&PortInfo> {
    ports
        .iter()
        .find(|p| p.looks_like_keyer())
        .or_else(|| ports.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, desc: Option<&str>) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            description: desc.map(str::to_string),
        }
    }

    #[test]
    fn test_suggest_prefers_known_adapter() {
        let ports = [
            port("/dev/ttyS0", None),
            port("/dev/ttyUSB0", Some("FT232R USB UART (FTDI)")),
        ];
        assert_eq!(suggest_port(&ports).unwrap().name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_suggest_falls_back_to_first() {
        let ports = [port("COM3", Some("Bluetooth")), port("COM4", None)];
        assert_eq!(suggest_port(&ports).unwrap().name, "COM3");
        assert!(suggest_port(&[]).is_none());
    }
}
