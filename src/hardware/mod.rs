//! Hardware I/O port access
//!
//! [`IoPortGrant`] is the privileged OS resource; [`SimulatedPorts`] stands
//! in for it when the process is unprivileged or under test.

pub mod ioport;
pub mod sim;

pub use ioport::{IoPortGrant, PortIo, PORT_READ_FALLBACK};
pub use sim::SimulatedPorts;
