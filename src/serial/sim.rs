//! In-memory serial transport
//!
//! Plays back queued read chunks and records every write. Clones share
//! state, so a test keeps one handle while the engine owns the other.

use super::port::SerialTransport;
use crate::error::{PanelError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct SimState {
    reads: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
    short_writes: bool,
}

/// Scripted stand-in for the panel's serial link
#[derive(Debug, Clone, Default)]
pub struct ScriptedSerial {
    state: Arc<Mutex<SimState>>,
}

impl ScriptedSerial {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one chunk to be returned by a future `read_available`
    pub fn push_read(&self, bytes: &[u8]) {
        self.state().reads.push_back(bytes.to_vec());
    }

    /// Number of queued chunks not yet read
    pub fn pending_reads(&self) -> usize {
        self.state().reads.len()
    }

    /// Every write, one entry per `write_all` call
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    /// Make subsequent writes fail with a broken pipe
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Make subsequent writes report a short write
    pub fn set_short_writes(&self, short: bool) {
        self.state().short_writes = short;
    }
}

impl SerialTransport for ScriptedSerial {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(PanelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        if state.short_writes && !data.is_empty() {
            return Err(PanelError::ShortWrite {
                written: data.len() - 1,
                expected: data.len(),
            });
        }
        state.writes.push(data.to_vec());
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        Ok(self.state().reads.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_play_back_in_order() {
        let handle = ScriptedSerial::new();
        let mut link = handle.clone();

        handle.push_read(&[0x53, 0x05]);
        handle.push_read(&[0x00, 0xFE]);

        assert_eq!(link.read_available().unwrap(), vec![0x53, 0x05]);
        assert_eq!(link.read_available().unwrap(), vec![0x00, 0xFE]);
        assert!(link.read_available().unwrap().is_empty());
    }

    #[test]
    fn test_write_failures() {
        let handle = ScriptedSerial::new();
        let mut link = handle.clone();

        link.write_all(&[0x4D, 0x06]).unwrap();
        handle.set_short_writes(true);
        assert!(matches!(
            link.write_all(&[0x4D, 0x05]),
            Err(PanelError::ShortWrite {
                written: 1,
                expected: 2
            })
        ));
        handle.set_short_writes(false);
        handle.set_fail_writes(true);
        assert!(matches!(link.write_all(&[0x4D]), Err(PanelError::Io(_))));

        assert_eq!(handle.writes(), vec![vec![0x4D, 0x06]]);
    }
}
