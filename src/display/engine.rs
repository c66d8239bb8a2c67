//! LCD writer and serial button reader
//!
//! The engine shares the serial link between callers writing to the LCD and
//! the `panel-display-rx` thread, which polls for button-state frames and
//! publishes transitions to the [`ButtonEventBus`].

use crate::button::{Button, ButtonEventBus, ButtonSource, PanelButtonEvent};
use crate::error::{PanelError, Result};
use crate::protocol::{progress_bar, split_lines, Command, Frame, FrameBuffer};
use crate::serial::SerialTransport;
use crate::shutdown::ShutdownSignal;
use log::{debug, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the reader asks the panel for its button state
pub const DEFAULT_BUTTON_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Gap between the synthesized press and release of a copy indicator
pub const COPY_INDICATOR_PULSE: Duration = Duration::from_millis(100);

const IDLE_BACKOFF: Duration = Duration::from_millis(50);
const BUSY_DELAY: Duration = Duration::from_millis(10);

type SharedLink = Arc<Mutex<Option<Box<dyn SerialTransport>>>>;

pub struct DisplayProtocolEngine {
    link: SharedLink,
    shutdown: ShutdownSignal,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DisplayProtocolEngine {
    /// Take ownership of `link`, enable button reporting and start the reader
    pub fn start(
        link: Box<dyn SerialTransport>,
        bus: Arc<ButtonEventBus>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let link: SharedLink = Arc::new(Mutex::new(Some(link)));
        let shutdown = ShutdownSignal::new();

        if let Err(e) = send(&link, &Command::EnableButtonReporting) {
            warn!("Failed to enable button reporting: {}", e);
        }

        let reader = {
            let link = Arc::clone(&link);
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("panel-display-rx".to_string())
                .spawn(move || read_loop(link, bus, shutdown, poll_interval))?
        };

        info!("Display engine started, polling buttons every {:?}", poll_interval);

        Ok(Self {
            link,
            shutdown,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Set the backlight, blank the screen, then show `default_text`
    pub fn initialize(&self, default_text: &str, backlight: bool) -> Result<()> {
        self.set_backlight(backlight)?;
        self.clear()?;
        self.write_text(default_text)
    }

    /// Write up to two newline-separated lines
    pub fn write_text(&self, text: &str) -> Result<()> {
        for (row, line) in split_lines(text).iter().enumerate() {
            self.write_line(row, line)?;
        }
        Ok(())
    }

    pub fn write_line(&self, row: usize, text: &str) -> Result<()> {
        let command = Command::write_line(row, text)?;
        self.send(&command)
    }

    pub fn clear(&self) -> Result<()> {
        self.write_text("")
    }

    pub fn set_backlight(&self, on: bool) -> Result<()> {
        self.send(&Command::Backlight(on))
    }

    pub fn request_button_state(&self) -> Result<()> {
        self.send(&Command::RequestButtonState)
    }

    /// Draw a progress bar on the second line
    pub fn show_progress(&self, percent: u8) -> Result<()> {
        self.write_line(1, &progress_bar(percent))
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Stop the reader and release the serial link. Safe to call more than once.
    pub fn close(&self) {
        if !self.shutdown.trigger() {
            return;
        }

        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Display reader panicked");
            }
        }

        lock_link(&self.link).take();
        debug!("Display engine closed");
    }

    fn send(&self, command: &Command) -> Result<()> {
        if self.is_closed() {
            return Err(PanelError::Closed);
        }
        send(&self.link, command)
    }
}

impl Drop for DisplayProtocolEngine {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_link(link: &SharedLink) -> MutexGuard<'_, Option<Box<dyn SerialTransport>>> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

fn send(link: &SharedLink, command: &Command) -> Result<()> {
    let bytes = command.encode();
    let mut guard = lock_link(link);
    let transport = guard.as_mut().ok_or(PanelError::Closed)?;
    trace!("TX {}", hex(&bytes));
    transport.write_all(&bytes)
}

fn read_loop(
    link: SharedLink,
    bus: Arc<ButtonEventBus>,
    shutdown: ShutdownSignal,
    poll_interval: Duration,
) {
    let mut frames = FrameBuffer::new();
    let mut last_poll: Option<Instant> = None;

    while !shutdown.is_triggered() {
        if last_poll.map_or(true, |at| at.elapsed() >= poll_interval) {
            if let Err(e) = send(&link, &Command::RequestButtonState) {
                debug!("Button state request failed: {}", e);
            }
            last_poll = Some(Instant::now());
        }

        let read = match lock_link(&link).as_mut() {
            Some(transport) => transport.read_available(),
            None => break,
        };

        let delay = match read {
            Ok(bytes) if !bytes.is_empty() => {
                debug!("RX {}", hex(&bytes));
                frames.extend(&bytes);
                for frame in frames.drain_frames() {
                    handle_frame(frame, &bus, &shutdown);
                }
                BUSY_DELAY
            }
            Ok(_) => IDLE_BACKOFF,
            Err(e) => {
                debug!("Serial read error: {}", e);
                IDLE_BACKOFF
            }
        };

        if shutdown.wait_timeout(delay) {
            break;
        }
    }

    debug!(
        "Display reader stopped ({} buffer resets)",
        frames.overflows()
    );
}

fn handle_frame(frame: Frame, bus: &ButtonEventBus, shutdown: &ShutdownSignal) {
    match frame {
        Frame::ButtonState(state) => {
            for (button, pressed) in state.buttons() {
                bus.publish(PanelButtonEvent::new(button, pressed, ButtonSource::Serial));
            }
        }
        Frame::ControllerEcho(echo) => trace!("Controller echo {}", hex(&echo)),
        Frame::CopyIndicator(prefix) => {
            debug!("Copy indicator 0x{:02x}", prefix);
            bus.forward(PanelButtonEvent::new(
                Button::UsbCopy,
                true,
                ButtonSource::Serial,
            ));
            shutdown.wait_timeout(COPY_INDICATOR_PULSE);
            bus.forward(PanelButtonEvent::new(
                Button::UsbCopy,
                false,
                ButtonSource::Serial,
            ));
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
