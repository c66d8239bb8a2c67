//! Serial link to the front-panel controller
//!
//! This module provides:
//! - Opening the panel's serial device with 8N1 framing and a short read timeout
//! - Complete-or-fail writes and best-effort non-blocking reads
//! - Serial port enumeration for the CLI
//! - An in-memory scripted transport for tests

pub mod port;
pub mod sim;

pub use port::{list_ports, PortConfig, PortInfo, PortType, SerialLink, SerialTransport};
pub use sim::ScriptedSerial;
