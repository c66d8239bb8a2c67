//! Simulated I/O ports
//!
//! Plain ports read back the last value written (default `0xFF`). An
//! optional index/data pair emulates the panel's indexed LED registers:
//! writing the index port selects a register, the data port reads and writes
//! the selected register.

use super::ioport::PortIo;
use crate::error::{PanelError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct SimState {
    ports: HashMap<u16, u8>,
    indexed: Option<(u16, u16)>,
    selected: u8,
    registers: HashMap<u8, u8>,
    data_writes: usize,
    fail_reads: bool,
    read_script: HashMap<u16, Vec<u8>>,
}

/// In-memory [`PortIo`] for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct SimulatedPorts {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulate an index/data register pair on the given ports
    pub fn with_indexed_pair(index_port: u16, data_port: u16) -> Self {
        let sim = Self::new();
        sim.state().indexed = Some((index_port, data_port));
        sim
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_port(&self, port: u16, value: u8) {
        self.state().ports.insert(port, value);
    }

    pub fn port(&self, port: u16) -> u8 {
        self.state().ports.get(&port).copied().unwrap_or(0xFF)
    }

    /// Values returned by successive reads of `port` before falling back to
    /// the stored value
    pub fn script_reads(&self, port: u16, values: &[u8]) {
        self.state().read_script.insert(port, values.to_vec());
    }

    pub fn set_register(&self, register: u8, value: u8) {
        self.state().registers.insert(register, value);
    }

    pub fn register(&self, register: u8) -> u8 {
        self.state().registers.get(&register).copied().unwrap_or(0xFF)
    }

    /// Number of writes that reached the data port of the indexed pair
    pub fn data_writes(&self) -> usize {
        self.state().data_writes
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }
}

impl PortIo for SimulatedPorts {
    fn read_byte(&self, port: u16) -> Result<u8> {
        let mut state = self.state();
        if state.fail_reads {
            return Err(PanelError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated read failure",
            )));
        }

        if let Some(script) = state.read_script.get_mut(&port) {
            if !script.is_empty() {
                return Ok(script.remove(0));
            }
        }

        if let Some((_, data_port)) = state.indexed {
            if port == data_port {
                let selected = state.selected;
                return Ok(state.registers.get(&selected).copied().unwrap_or(0xFF));
            }
        }

        Ok(state.ports.get(&port).copied().unwrap_or(0xFF))
    }

    fn write_byte(&self, port: u16, value: u8) -> Result<()> {
        let mut state = self.state();

        if let Some((index_port, data_port)) = state.indexed {
            if port == index_port {
                state.selected = value;
                return Ok(());
            }
            if port == data_port {
                let selected = state.selected;
                state.registers.insert(selected, value);
                state.data_writes += 1;
                return Ok(());
            }
        }

        state.ports.insert(port, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ports_default_high() {
        let sim = SimulatedPorts::new();
        assert_eq!(sim.read_byte(0xa05).unwrap(), 0xFF);
        sim.write_byte(0xa05, 0xFE).unwrap();
        assert_eq!(sim.read_byte(0xa05).unwrap(), 0xFE);
    }

    #[test]
    fn test_indexed_pair() {
        let sim = SimulatedPorts::with_indexed_pair(0xa05, 0xa06);
        sim.write_byte(0xa05, 0x81).unwrap();
        sim.write_byte(0xa06, 0xFE).unwrap();
        sim.write_byte(0xa05, 0x91).unwrap();
        assert_eq!(sim.read_byte(0xa06).unwrap(), 0xFF);
        sim.write_byte(0xa05, 0x81).unwrap();
        assert_eq!(sim.read_byte(0xa06).unwrap(), 0xFE);
        assert_eq!(sim.register(0x81), 0xFE);
        assert_eq!(sim.data_writes(), 1);
    }

    #[test]
    fn test_scripted_reads() {
        let sim = SimulatedPorts::new();
        sim.script_reads(0xa05, &[0xFE, 0xFF]);
        assert_eq!(sim.read_byte(0xa05).unwrap(), 0xFE);
        assert_eq!(sim.read_byte(0xa05).unwrap(), 0xFF);
        sim.set_port(0xa05, 0x00);
        assert_eq!(sim.read_byte(0xa05).unwrap(), 0x00);
    }
}
