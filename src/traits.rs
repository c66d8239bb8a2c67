//! Capabilities the panel exposes to menu and copy-pipeline code
//!
//! Collaborators depend on these instead of the concrete controller so they
//! can be driven by test doubles.

use crate::display::DisplayProtocolEngine;
use crate::error::Result;
use crate::led::{LedRegisterDriver, LogicalLed};

/// Writes text to a two-line display
pub trait TextDisplay {
    /// Write up to two newline-separated lines
    fn write_text(&self, text: &str) -> Result<()>;

    /// Replace a single line
    fn write_text_at(&self, row: usize, text: &str) -> Result<()>;
}

pub trait Backlight {
    fn set_backlight(&self, on: bool) -> Result<()>;
}

/// Sets named LEDs and per-disk activity
pub trait LedControl {
    fn set_led(&self, led: LogicalLed, on: bool) -> Result<()>;

    /// Disk activity by 1-based index
    fn set_disk_activity(&self, disk: usize, active: bool) -> Result<()>;
}

impl TextDisplay for DisplayProtocolEngine {
    fn write_text(&self, text: &str) -> Result<()> {
        DisplayProtocolEngine::write_text(self, text)
    }

    fn write_text_at(&self, row: usize, text: &str) -> Result<()> {
        self.write_line(row, text)
    }
}

impl Backlight for DisplayProtocolEngine {
    fn set_backlight(&self, on: bool) -> Result<()> {
        DisplayProtocolEngine::set_backlight(self, on)
    }
}

impl LedControl for LedRegisterDriver {
    fn set_led(&self, led: LogicalLed, on: bool) -> Result<()> {
        LedRegisterDriver::set_led(self, led, on)
    }

    fn set_disk_activity(&self, disk: usize, active: bool) -> Result<()> {
        self.set_led(LogicalLed::disk(disk)?, active)
    }
}
