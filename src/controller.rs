//! Panel controller
//!
//! Owns every panel resource and exposes the operations menu and
//! copy-pipeline code use. Only the serial link is required; LED control and
//! the USB copy button degrade to no-ops when their I/O ports cannot be
//! acquired.

use crate::button::{ButtonEventBus, ButtonHandler, ButtonPortEngine};
use crate::config::PanelConfig;
use crate::display::{DisplayProtocolEngine, DEFAULT_BUTTON_POLL_INTERVAL};
use crate::error::{PanelError, Result};
use crate::hardware::{IoPortGrant, PortIo};
use crate::led::{
    led_by_name, LedRegisterDriver, LogicalLed, LED_INDEX_PORT, LED_PORT_COUNT,
};
use crate::serial::{SerialLink, SerialTransport};
use crate::shutdown::ShutdownSignal;
use crate::traits::{Backlight, LedControl, TextDisplay};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Pre-opened transports for building a controller without touching hardware
pub struct PanelParts {
    pub serial: Box<dyn SerialTransport>,
    pub led_io: Option<Arc<dyn PortIo>>,
    pub button_io: Option<Arc<dyn PortIo>>,
    pub button_port: u16,
    pub button_poll_interval: Duration,
    pub copy_poll_interval: Duration,
    pub default_text: String,
    /// Backlight state set by `initialize`
    pub backlight: bool,
}

impl PanelParts {
    pub fn new(serial: Box<dyn SerialTransport>) -> Self {
        let defaults = PanelConfig::default();
        Self {
            serial,
            led_io: None,
            button_io: None,
            button_port: defaults.usb_copy.io_port,
            button_poll_interval: DEFAULT_BUTTON_POLL_INTERVAL,
            copy_poll_interval: defaults.copy_poll_interval(),
            default_text: defaults.display.default_text,
            backlight: defaults.display.backlight,
        }
    }

    pub fn with_led_io(mut self, io: Arc<dyn PortIo>) -> Self {
        self.led_io = Some(io);
        self
    }

    pub fn with_button_io(mut self, io: Arc<dyn PortIo>) -> Self {
        self.button_io = Some(io);
        self
    }
}

pub struct PanelController {
    bus: Arc<ButtonEventBus>,
    display: DisplayProtocolEngine,
    leds: Arc<LedRegisterDriver>,
    copy_button: Option<ButtonPortEngine>,
    led_grant: Option<Arc<IoPortGrant>>,
    button_grant: Option<Arc<IoPortGrant>>,
    default_text: String,
    backlight: bool,
    shutdown: ShutdownSignal,
    closed: Mutex<bool>,
}

impl PanelController {
    /// Open the panel hardware described by `config`.
    ///
    /// Fails only if the serial link cannot be opened.
    pub fn open(config: &PanelConfig) -> Result<Self> {
        let link = SerialLink::open(config.port_config())?;
        let mut controller = Self::start(
            Box::new(link),
            config.button_poll_interval(),
            config.display.default_text.clone(),
            config.display.backlight,
        )?;

        if config.leds.enabled {
            match IoPortGrant::acquire(LED_INDEX_PORT, LED_PORT_COUNT) {
                Ok(grant) => {
                    let grant = Arc::new(grant);
                    controller.attach_leds(Arc::clone(&grant) as Arc<dyn PortIo>);
                    controller.led_grant = Some(grant);
                }
                Err(e) => warn!("LED control unavailable: {}", e),
            }
        }

        if config.usb_copy_active() {
            let port = config.usb_copy.io_port;
            match IoPortGrant::acquire(port, 1) {
                Ok(grant) => {
                    let grant = Arc::new(grant);
                    controller.attach_copy_button(
                        Arc::clone(&grant) as Arc<dyn PortIo>,
                        port,
                        config.copy_poll_interval(),
                    )?;
                    controller.button_grant = Some(grant);
                }
                Err(e) => warn!("USB copy button unavailable: {}", e),
            }
        }

        Ok(controller)
    }

    /// Build a controller from already opened transports
    pub fn from_parts(parts: PanelParts) -> Result<Self> {
        let mut controller = Self::start(
            parts.serial,
            parts.button_poll_interval,
            parts.default_text,
            parts.backlight,
        )?;

        if let Some(io) = parts.led_io {
            controller.attach_leds(io);
        }
        if let Some(io) = parts.button_io {
            controller.attach_copy_button(io, parts.button_port, parts.copy_poll_interval)?;
        }

        Ok(controller)
    }

    fn start(
        serial: Box<dyn SerialTransport>,
        poll_interval: Duration,
        default_text: String,
        backlight: bool,
    ) -> Result<Self> {
        let bus = Arc::new(ButtonEventBus::new()?);
        let display = DisplayProtocolEngine::start(serial, Arc::clone(&bus), poll_interval)?;

        Ok(Self {
            bus,
            display,
            leds: Arc::new(LedRegisterDriver::disabled()),
            copy_button: None,
            led_grant: None,
            button_grant: None,
            default_text,
            backlight,
            shutdown: ShutdownSignal::new(),
            closed: Mutex::new(false),
        })
    }

    fn attach_leds(&mut self, io: Arc<dyn PortIo>) {
        self.leds = Arc::new(LedRegisterDriver::new(io));
        info!("LED control enabled");
    }

    fn attach_copy_button(
        &mut self,
        io: Arc<dyn PortIo>,
        port: u16,
        poll_interval: Duration,
    ) -> Result<()> {
        let engine = ButtonPortEngine::new(io, port).with_poll_interval(poll_interval);
        engine.start(Arc::clone(&self.bus))?;
        self.copy_button = Some(engine);
        Ok(())
    }

    /// Configured backlight, default text, green status LED, USB and disk
    /// LEDs off
    pub fn initialize(&self) -> Result<()> {
        self.ensure_open()?;
        self.display.initialize(&self.default_text, self.backlight)?;

        let mut changes = vec![
            (LogicalLed::StatusGreen, true),
            (LogicalLed::StatusRed, false),
            (LogicalLed::Usb, false),
        ];
        changes.extend(LogicalLed::DISKS.iter().map(|&disk| (disk, false)));
        self.leds.set_leds(&changes)
    }

    pub fn write_text(&self, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.display.write_text(text)
    }

    pub fn write_text_at(&self, row: usize, text: &str) -> Result<()> {
        self.ensure_open()?;
        self.display.write_line(row, text)
    }

    pub fn clear_display(&self) -> Result<()> {
        self.ensure_open()?;
        self.display.clear()
    }

    pub fn set_backlight(&self, on: bool) -> Result<()> {
        self.ensure_open()?;
        self.display.set_backlight(on)
    }

    pub fn show_progress(&self, percent: u8) -> Result<()> {
        self.ensure_open()?;
        self.display.show_progress(percent)
    }

    /// Register the button handler, replacing any previous one
    pub fn set_button_handler<H>(&self, handler: H)
    where
        H: ButtonHandler + 'static,
    {
        self.bus.set_handler(Arc::new(handler));
    }

    pub fn clear_button_handler(&self) {
        self.bus.clear_handler();
    }

    pub fn set_led(&self, led: LogicalLed, on: bool) -> Result<()> {
        self.ensure_open()?;
        self.leds.set_led(led, on)
    }

    pub fn set_led_by_name(&self, name: &str, on: bool) -> Result<()> {
        let led = led_by_name(name)?;
        self.set_led(led, on)
    }

    /// `None` when LED control is unavailable
    pub fn led_state(&self, led: LogicalLed) -> Result<Option<bool>> {
        self.ensure_open()?;
        self.leds.led_state(led)
    }

    pub fn led_states(&self) -> Result<BTreeMap<LogicalLed, bool>> {
        self.ensure_open()?;
        self.leds.led_states()
    }

    pub fn set_status_leds(&self, red: bool, green: bool) -> Result<()> {
        self.ensure_open()?;
        self.leds.set_status(red, green)
    }

    /// Show `status` and switch the status LED to red or green
    pub fn set_system_status(&self, status: &str, is_error: bool) -> Result<()> {
        self.ensure_open()?;
        let shown = self.display.write_text(status);
        self.leds.set_status(is_error, !is_error)?;
        shown
    }

    /// Disk activity LED by 1-based index
    pub fn set_disk_activity(&self, disk: usize, active: bool) -> Result<()> {
        let led = LogicalLed::disk(disk)?;
        self.set_led(led, active)
    }

    /// Light a disk LED for `duration` in the background
    pub fn flash_disk_led(&self, disk: usize, duration: Duration) -> Result<()> {
        let led = LogicalLed::disk(disk)?;
        self.ensure_open()?;
        if !self.leds.is_enabled() {
            return Ok(());
        }

        self.leds.set_led(led, true)?;

        let leds = Arc::clone(&self.leds);
        let shutdown = self.shutdown.clone();
        thread::Builder::new()
            .name("panel-disk-flash".to_string())
            .spawn(move || {
                if shutdown.wait_timeout(duration) {
                    return;
                }
                if let Err(e) = leds.set_led(led, false) {
                    debug!("Failed to turn off {}: {}", led, e);
                }
            })?;
        Ok(())
    }

    /// Block until the USB copy button is pressed or `timeout` elapses.
    ///
    /// Without a copy button this waits out the timeout and reports no press.
    pub fn wait_for_copy_press(&self, timeout: Duration) -> Result<bool> {
        self.ensure_open()?;
        match &self.copy_button {
            Some(engine) => engine.wait_for_press(timeout),
            None if self.shutdown.wait_timeout(timeout) => Err(PanelError::Closed),
            None => Ok(false),
        }
    }

    pub fn has_led_control(&self) -> bool {
        self.leds.is_enabled()
    }

    pub fn has_usb_copy_button(&self) -> bool {
        self.copy_button.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Stop every engine and release the hardware.
    ///
    /// Safe to call more than once and from several threads; every call
    /// after the first returns `Ok(())`.
    pub fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Ok(());
        }
        *closed = true;
        self.shutdown.trigger();

        if let Some(engine) = &self.copy_button {
            engine.close();
        }

        let mut result = Ok(());
        for grant in [&self.button_grant, &self.led_grant].into_iter().flatten() {
            if let Err(e) = grant.release() {
                warn!("Failed to release I/O port 0x{:x}: {}", grant.base(), e);
                result = Err(e);
            }
        }

        self.display.close();
        self.bus.close();
        info!("Panel controller closed");
        result
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(PanelError::Closed);
        }
        Ok(())
    }
}

impl Drop for PanelController {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error while closing panel controller: {}", e);
        }
    }
}

impl TextDisplay for PanelController {
    fn write_text(&self, text: &str) -> Result<()> {
        PanelController::write_text(self, text)
    }

    fn write_text_at(&self, row: usize, text: &str) -> Result<()> {
        PanelController::write_text_at(self, row, text)
    }
}

impl Backlight for PanelController {
    fn set_backlight(&self, on: bool) -> Result<()> {
        PanelController::set_backlight(self, on)
    }
}

impl LedControl for PanelController {
    fn set_led(&self, led: LogicalLed, on: bool) -> Result<()> {
        PanelController::set_led(self, led, on)
    }

    fn set_disk_activity(&self, disk: usize, active: bool) -> Result<()> {
        PanelController::set_disk_activity(self, disk, active)
    }
}
