//! Serial port configuration and connection management
//!
//! The panel controller talks 1200 baud 8N1. Reads use a short timeout so the
//! display reader can poll promptly instead of blocking.

use crate::error::{PanelError, Result};
use log::{debug, info};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Baud rate of the front-panel controller
pub const PANEL_BAUD: u32 = 1200;

/// Serial device the panel controller is wired to
pub const DEFAULT_DEVICE: &str = "/dev/ttyS1";

/// Read timeout that keeps button polling responsive
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest chunk pulled from the device per read
const READ_CHUNK: usize = 256;

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyS1)
    pub port_path: String,
    /// Baud rate (default: 1200)
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 1)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from(DEFAULT_DEVICE),
            baud_rate: PANEL_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl PortConfig {
    /// Create a new configuration with the panel's default framing
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the framing matches what the panel controller expects
    pub fn is_8n1(&self) -> bool {
        self.data_bits == DataBits::Eight
            && self.parity == Parity::None
            && self.stop_bits == StopBits::One
    }
}

/// Byte transport used by the display engine
///
/// Implemented by [`SerialLink`] for real hardware and by
/// [`ScriptedSerial`](super::ScriptedSerial) in tests.
pub trait SerialTransport: Send {
    /// Write every byte or fail. A short write is [`PanelError::ShortWrite`].
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Return whatever bytes are available right now.
    ///
    /// Timeouts, EOF and "no data" yield an empty vector, never an error.
    fn read_available(&mut self) -> Result<Vec<u8>>;
}

/// Exclusive owner of the panel's open serial device
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialLink {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|source| PanelError::SerialOpen {
                device: config.port_path.clone(),
                source,
            })?;

        info!(
            "Serial port configured: {} at {} baud, 8N1",
            config.port_path, config.baud_rate
        );

        Ok(Self { port, config })
    }

    /// Get the port configuration
    pub fn config(&self) -> &PortConfig {
        &self.config
    }
}

impl SerialTransport for SerialLink {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let written = self.port.write(data)?;
        if written != data.len() {
            return Err(PanelError::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let mut buffer = [0u8; READ_CHUNK];

        match self.port.read(&mut buffer) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => Ok(buffer[..n].to_vec()),
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut
                        | ErrorKind::WouldBlock
                        | ErrorKind::Interrupted
                        | ErrorKind::UnexpectedEof
                ) =>
            {
                Ok(Vec::new())
            }
            Err(e) => {
                debug!("Serial read failed on {}: {}", self.config.port_path, e);
                Err(PanelError::Io(e))
            }
        }
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub product: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// List all available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        PanelError::Io(std::io::Error::new(
            ErrorKind::Other,
            format!("failed to enumerate serial ports: {}", e),
        ))
    })?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (port_type, product, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    PortType::UsbSerial,
                    info.product,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::PciPort => (PortType::PciSerial, None, None, None),
                serialport::SerialPortType::BluetoothPort => {
                    (PortType::Bluetooth, None, None, None)
                }
                serialport::SerialPortType::Unknown => (PortType::Unknown, None, None, None),
            };

            PortInfo {
                path: p.port_name,
                port_type,
                product,
                vid,
                pid,
            }
        })
        .collect())
}
