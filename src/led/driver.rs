//! Read-modify-write LED driver
//!
//! Several LEDs share one register, so every update reads the register,
//! changes only the affected bits and writes the byte back. The
//! select-read-select-write sequence runs under one lock per driver.

use super::table::{LedRegister, LogicalLed, LED_DATA_PORT, LED_INDEX_PORT};
use crate::error::Result;
use crate::hardware::PortIo;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

pub struct LedRegisterDriver {
    io: Option<Arc<dyn PortIo>>,
    lock: Mutex<()>,
}

impl LedRegisterDriver {
    /// Driver without port access; every operation is a no-op
    pub fn disabled() -> Self {
        Self {
            io: None,
            lock: Mutex::new(()),
        }
    }

    pub fn new(io: Arc<dyn PortIo>) -> Self {
        Self {
            io: Some(io),
            lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.io.is_some()
    }

    pub fn set_led(&self, led: LogicalLed, on: bool) -> Result<()> {
        self.set_leds(&[(led, on)])
    }

    /// Apply several changes with one read-modify-write per register
    pub fn set_leds(&self, changes: &[(LogicalLed, bool)]) -> Result<()> {
        let Some(io) = &self.io else {
            return Ok(());
        };

        let mut by_register: BTreeMap<LedRegister, Vec<(LogicalLed, bool)>> = BTreeMap::new();
        for &(led, on) in changes {
            by_register
                .entry(led.binding().register)
                .or_default()
                .push((led, on));
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        for (register, leds) in by_register {
            let current = read_register(io.as_ref(), register)?;
            let updated = leds
                .iter()
                .fold(current, |value, (led, on)| led.binding().apply(value, *on));

            if updated == current {
                trace!("LED register 0x{:02x} unchanged", register.index());
                continue;
            }

            write_register(io.as_ref(), register, updated)?;
            debug!(
                "LED register 0x{:02x}: 0x{:02x} -> 0x{:02x}",
                register.index(),
                current,
                updated
            );
        }

        Ok(())
    }

    /// Set disk LEDs by 1-based index. Indices are checked even when disabled.
    pub fn set_disk_leds(&self, disks: &BTreeMap<usize, bool>) -> Result<()> {
        let changes = disks
            .iter()
            .map(|(&index, &on)| Ok((LogicalLed::disk(index)?, on)))
            .collect::<Result<Vec<_>>>()?;
        self.set_leds(&changes)
    }

    pub fn set_status(&self, red: bool, green: bool) -> Result<()> {
        self.set_leds(&[(LogicalLed::StatusRed, red), (LogicalLed::StatusGreen, green)])
    }

    /// Current state of one LED, `None` when disabled
    pub fn led_state(&self, led: LogicalLed) -> Result<Option<bool>> {
        let Some(io) = &self.io else {
            return Ok(None);
        };

        let binding = led.binding();
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let value = read_register(io.as_ref(), binding.register)?;
        Ok(Some(binding.is_on(value)))
    }

    /// State of every LED, empty when disabled
    pub fn led_states(&self) -> Result<BTreeMap<LogicalLed, bool>> {
        let Some(io) = &self.io else {
            return Ok(BTreeMap::new());
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut registers = BTreeMap::new();
        let mut states = BTreeMap::new();
        for led in LogicalLed::ALL {
            let binding = led.binding();
            let value = match registers.get(&binding.register) {
                Some(value) => *value,
                None => {
                    let value = read_register(io.as_ref(), binding.register)?;
                    registers.insert(binding.register, value);
                    value
                }
            };
            states.insert(led, binding.is_on(value));
        }
        Ok(states)
    }
}

fn read_register(io: &dyn PortIo, register: LedRegister) -> Result<u8> {
    io.write_byte(LED_INDEX_PORT, register.index())?;
    io.read_byte(LED_DATA_PORT)
}

fn write_register(io: &dyn PortIo, register: LedRegister, value: u8) -> Result<()> {
    io.write_byte(LED_INDEX_PORT, register.index())?;
    io.write_byte(LED_DATA_PORT, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanelError;
    use crate::hardware::SimulatedPorts;
    use std::thread;

    fn driver() -> (LedRegisterDriver, SimulatedPorts) {
        let sim = SimulatedPorts::with_indexed_pair(LED_INDEX_PORT, LED_DATA_PORT);
        (LedRegisterDriver::new(Arc::new(sim.clone())), sim)
    }

    #[test]
    fn test_disk_leds_share_register() {
        let (driver, sim) = driver();

        driver.set_led(LogicalLed::Disk1, true).unwrap();
        driver.set_led(LogicalLed::Disk2, true).unwrap();
        assert_eq!(driver.led_state(LogicalLed::Disk1).unwrap(), Some(true));
        assert_eq!(driver.led_state(LogicalLed::Disk2).unwrap(), Some(true));
        assert_eq!(sim.register(0x81), 0xFC);

        driver.set_led(LogicalLed::Disk1, false).unwrap();
        assert_eq!(driver.led_state(LogicalLed::Disk1).unwrap(), Some(false));
        assert_eq!(driver.led_state(LogicalLed::Disk2).unwrap(), Some(true));
    }

    #[test]
    fn test_one_write_per_register() {
        let (driver, sim) = driver();
        driver
            .set_leds(&[
                (LogicalLed::Disk1, true),
                (LogicalLed::Disk4, true),
                (LogicalLed::Disk6, true),
                (LogicalLed::StatusGreen, true),
            ])
            .unwrap();
        assert_eq!(sim.data_writes(), 2);
        assert_eq!(sim.register(0x81), 0xD6);
        assert_eq!(sim.register(0x91), 0xFB);
    }

    #[test]
    fn test_unchanged_register_not_written() {
        let (driver, sim) = driver();
        driver.set_led(LogicalLed::Usb, false).unwrap();
        assert_eq!(sim.data_writes(), 0);
        driver.set_led(LogicalLed::Usb, true).unwrap();
        assert_eq!(sim.data_writes(), 1);
        assert_eq!(sim.register(0xE1), 0x7F);
    }

    #[test]
    fn test_status() {
        let (driver, sim) = driver();
        sim.set_register(0x91, 0xFF);
        driver.set_status(true, false).unwrap();
        assert_eq!(sim.register(0x91), 0xF7);
        let states = driver.led_states().unwrap();
        assert_eq!(states[&LogicalLed::StatusRed], true);
        assert_eq!(states[&LogicalLed::StatusGreen], false);
        assert_eq!(states.len(), 9);
    }

    #[test]
    fn test_set_disk_leds_validates_indices() {
        let (driver, sim) = driver();
        let bad: BTreeMap<usize, bool> = [(2, true), (7, true)].into_iter().collect();
        assert!(matches!(
            driver.set_disk_leds(&bad),
            Err(PanelError::InvalidDisk(7))
        ));
        assert_eq!(sim.data_writes(), 0);

        let disabled = LedRegisterDriver::disabled();
        let zero: BTreeMap<usize, bool> = [(0, true)].into_iter().collect();
        assert!(matches!(
            disabled.set_disk_leds(&zero),
            Err(PanelError::InvalidDisk(0))
        ));
    }

    #[test]
    fn test_disabled_driver_is_noop() {
        let driver = LedRegisterDriver::disabled();
        assert!(!driver.is_enabled());
        driver.set_led(LogicalLed::Disk1, true).unwrap();
        driver.set_status(true, true).unwrap();
        assert_eq!(driver.led_state(LogicalLed::Disk1).unwrap(), None);
        assert!(driver.led_states().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_updates_keep_every_bit() {
        let (driver, sim) = driver();
        let driver = Arc::new(driver);

        let handles: Vec<_> = LogicalLed::DISKS
            .iter()
            .map(|&led| {
                let driver = Arc::clone(&driver);
                thread::spawn(move || {
                    for _ in 0..50 {
                        driver.set_led(led, true).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sim.register(0x81), 0xC0);
    }
}
