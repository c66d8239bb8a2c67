//! Panel buttons and the unified button event stream
//!
//! ENTER and SELECT arrive over the serial link; USB_COPY can arrive over the
//! serial link or from its own I/O port. Both sources feed one
//! [`ButtonEventBus`], which drops repeats and hands changes to a single
//! registered handler.

pub mod bus;
pub mod dispatch;
pub mod port_engine;

pub use bus::{ButtonEventBus, ButtonHandler};
pub use dispatch::Dispatcher;
pub use port_engine::{majority, ButtonPortEngine, DEFAULT_BUTTON_PORT};

use std::fmt;

/// Physical panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    Enter,
    Select,
    UsbCopy,
}

impl Button {
    pub const ALL: [Button; 3] = [Button::Enter, Button::Select, Button::UsbCopy];

    pub(crate) fn index(self) -> usize {
        match self {
            Button::Enter => 0,
            Button::Select => 1,
            Button::UsbCopy => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::Enter => "ENTER",
            Button::Select => "SELECT",
            Button::UsbCopy => "USB_COPY",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which poller observed a button transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonSource {
    /// Button-state frames from the panel's serial controller
    Serial,
    /// Direct sampling of the USB copy button's I/O port
    IoPort,
}

impl fmt::Display for ButtonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonSource::Serial => f.write_str("serial"),
            ButtonSource::IoPort => f.write_str("io-port"),
        }
    }
}

/// One observed button transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelButtonEvent {
    pub button: Button,
    pub pressed: bool,
    pub source: ButtonSource,
}

impl PanelButtonEvent {
    pub fn new(button: Button, pressed: bool, source: ButtonSource) -> Self {
        Self {
            button,
            pressed,
            source,
        }
    }
}

impl fmt::Display for PanelButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.button,
            if self.pressed { "pressed" } else { "released" },
            self.source
        )
    }
}
