//! LED register map
//!
//! Every LED is one active-low bit in a byte-wide register selected through
//! the index/data port pair.

use crate::error::{PanelError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Port selecting which LED register the data port addresses
pub const LED_INDEX_PORT: u16 = 0xa05;
/// Port carrying the selected register's value
pub const LED_DATA_PORT: u16 = 0xa06;
/// Ports covered by the LED grant, starting at [`LED_INDEX_PORT`]
pub const LED_PORT_COUNT: u16 = 2;

/// Number of disk activity LEDs
pub const DISK_LED_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LedRegister {
    Status = 0x91,
    Disk = 0x81,
    Usb = 0xE1,
}

impl LedRegister {
    pub fn index(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalLed {
    StatusGreen,
    StatusRed,
    Usb,
    Disk1,
    Disk2,
    Disk3,
    Disk4,
    Disk5,
    Disk6,
}

/// Where one LED lives in hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedBinding {
    pub register: LedRegister,
    pub bit: u8,
    pub active_low: bool,
}

impl LedBinding {
    fn mask(self) -> u8 {
        1 << self.bit
    }

    /// Register value with this LED switched, other bits untouched
    pub fn apply(self, value: u8, on: bool) -> u8 {
        if on == self.active_low {
            value & !self.mask()
        } else {
            value | self.mask()
        }
    }

    pub fn is_on(self, value: u8) -> bool {
        (value & self.mask() != 0) != self.active_low
    }
}

impl LogicalLed {
    pub const ALL: [LogicalLed; 9] = [
        LogicalLed::StatusGreen,
        LogicalLed::StatusRed,
        LogicalLed::Usb,
        LogicalLed::Disk1,
        LogicalLed::Disk2,
        LogicalLed::Disk3,
        LogicalLed::Disk4,
        LogicalLed::Disk5,
        LogicalLed::Disk6,
    ];

    pub const DISKS: [LogicalLed; DISK_LED_COUNT] = [
        LogicalLed::Disk1,
        LogicalLed::Disk2,
        LogicalLed::Disk3,
        LogicalLed::Disk4,
        LogicalLed::Disk5,
        LogicalLed::Disk6,
    ];

    /// Disk LED by 1-based index
    pub fn disk(index: usize) -> Result<Self> {
        index
            .checked_sub(1)
            .and_then(|i| Self::DISKS.get(i).copied())
            .ok_or(PanelError::InvalidDisk(index))
    }

    pub fn binding(self) -> LedBinding {
        let (register, bit) = match self {
            LogicalLed::StatusGreen => (LedRegister::Status, 2),
            LogicalLed::StatusRed => (LedRegister::Status, 3),
            LogicalLed::Usb => (LedRegister::Usb, 7),
            LogicalLed::Disk1 => (LedRegister::Disk, 0),
            LogicalLed::Disk2 => (LedRegister::Disk, 1),
            LogicalLed::Disk3 => (LedRegister::Disk, 2),
            LogicalLed::Disk4 => (LedRegister::Disk, 3),
            LogicalLed::Disk5 => (LedRegister::Disk, 4),
            LogicalLed::Disk6 => (LedRegister::Disk, 5),
        };
        LedBinding {
            register,
            bit,
            active_low: true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LogicalLed::StatusGreen => "status-green",
            LogicalLed::StatusRed => "status-red",
            LogicalLed::Usb => "usb",
            LogicalLed::Disk1 => "disk1",
            LogicalLed::Disk2 => "disk2",
            LogicalLed::Disk3 => "disk3",
            LogicalLed::Disk4 => "disk4",
            LogicalLed::Disk5 => "disk5",
            LogicalLed::Disk6 => "disk6",
        }
    }
}

impl fmt::Display for LogicalLed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// LED names accepted on the command line, including short aliases
static LED_NAMES: Lazy<HashMap<&'static str, LogicalLed>> = Lazy::new(|| {
    let mut names: HashMap<&'static str, LogicalLed> =
        LogicalLed::ALL.iter().map(|led| (led.name(), *led)).collect();
    names.insert("green", LogicalLed::StatusGreen);
    names.insert("red", LogicalLed::StatusRed);
    names
});

/// Look up an LED by name, case-insensitively
pub fn led_by_name(name: &str) -> Result<LogicalLed> {
    LED_NAMES
        .get(name.to_ascii_lowercase().as_str())
        .copied()
        .ok_or_else(|| PanelError::UnknownLed(name.to_string()))
}

/// Every accepted LED name, sorted
pub fn led_names() -> Vec<&'static str> {
    let mut names: Vec<_> = LED_NAMES.keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_table() {
        assert_eq!(LogicalLed::StatusGreen.binding().register.index(), 0x91);
        assert_eq!(LogicalLed::StatusGreen.binding().bit, 2);
        assert_eq!(LogicalLed::StatusRed.binding().bit, 3);
        assert_eq!(LogicalLed::Usb.binding().register.index(), 0xE1);
        assert_eq!(LogicalLed::Usb.binding().bit, 7);
        for (i, led) in LogicalLed::DISKS.iter().enumerate() {
            assert_eq!(led.binding().register, LedRegister::Disk);
            assert_eq!(led.binding().bit as usize, i);
        }
    }

    #[test]
    fn test_active_low_apply() {
        let disk3 = LogicalLed::Disk3.binding();
        assert_eq!(disk3.apply(0xFF, true), 0xFB);
        assert_eq!(disk3.apply(0xFB, false), 0xFF);
        assert!(disk3.is_on(0xFB));
        assert!(!disk3.is_on(0xFF));
        // Neighbouring bits survive.
        assert_eq!(disk3.apply(0x00, false), 0x04);
    }

    #[test]
    fn test_disk_index() {
        assert_eq!(LogicalLed::disk(1).unwrap(), LogicalLed::Disk1);
        assert_eq!(LogicalLed::disk(6).unwrap(), LogicalLed::Disk6);
        assert!(matches!(LogicalLed::disk(0), Err(PanelError::InvalidDisk(0))));
        assert!(matches!(LogicalLed::disk(7), Err(PanelError::InvalidDisk(7))));
    }

    #[test]
    fn test_led_by_name() {
        assert_eq!(led_by_name("green").unwrap(), LogicalLed::StatusGreen);
        assert_eq!(led_by_name("Status-Red").unwrap(), LogicalLed::StatusRed);
        assert_eq!(led_by_name("disk4").unwrap(), LogicalLed::Disk4);
        assert!(matches!(
            led_by_name("blue"),
            Err(PanelError::UnknownLed(name)) if name == "blue"
        ));
        assert_eq!(led_names().len(), 11);
    }
}
