//! Front-panel control for storage appliances
//!
//! Drives the 16x2 LCD over the panel's serial controller, reports the
//! ENTER, SELECT and USB copy buttons as one event stream, and switches the
//! status, USB and disk LEDs through the I/O-port LED registers.
//!
//! # Example
//!
//! ```no_run
//! use panelctl::{PanelConfig, PanelController, PanelButtonEvent};
//!
//! let panel = PanelController::open(&PanelConfig::default())?;
//! panel.initialize()?;
//! panel.set_button_handler(|event: PanelButtonEvent| println!("{event}"));
//! panel.write_text("Backup\nin progress")?;
//! panel.set_disk_activity(1, true)?;
//! panel.close()?;
//! # Ok::<(), panelctl::PanelError>(())
//! ```

pub mod button;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod hardware;
pub mod led;
pub mod protocol;
pub mod serial;
pub mod shutdown;
pub mod traits;

pub use button::{Button, ButtonEventBus, ButtonHandler, ButtonSource, PanelButtonEvent};
pub use config::PanelConfig;
pub use controller::{PanelController, PanelParts};
pub use error::{PanelError, Result};
pub use led::{led_by_name, LogicalLed};
pub use traits::{Backlight, LedControl, TextDisplay};
