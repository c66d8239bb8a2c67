//! USB copy button sampled from an I/O port
//!
//! The button pulls bit 0 of its port low while held. The poller takes a
//! short burst of samples, votes, and publishes debounced changes to the
//! [`ButtonEventBus`].

use super::{Button, ButtonEventBus, ButtonSource, PanelButtonEvent};
use crate::error::{PanelError, Result};
use crate::hardware::PortIo;
use crate::shutdown::ShutdownSignal;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// I/O port the USB copy button is wired to
pub const DEFAULT_BUTTON_PORT: u16 = 0xa05;

/// Interval between debounced samples
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

const BUTTON_BIT: u8 = 0x01;
const DEBOUNCE_SAMPLES: usize = 3;
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(20);
const WAIT_TICK: Duration = Duration::from_millis(10);

/// `true` if more than half of `samples` are `true`
pub fn majority(samples: &[bool]) -> bool {
    samples.iter().filter(|pressed| **pressed).count() * 2 > samples.len()
}

#[derive(Clone)]
struct Sampler {
    io: Arc<dyn PortIo>,
    port: u16,
    shutdown: ShutdownSignal,
}

impl Sampler {
    fn read_raw(&self) -> Result<bool> {
        Ok(self.io.read_byte(self.port)? & BUTTON_BIT == 0)
    }

    fn read_debounced(&self) -> Result<bool> {
        let gap = DEBOUNCE_WINDOW / (DEBOUNCE_SAMPLES as u32 - 1);
        let mut samples = [false; DEBOUNCE_SAMPLES];

        for (i, sample) in samples.iter_mut().enumerate() {
            if i > 0 && self.shutdown.wait_timeout(gap) {
                return Err(PanelError::Closed);
            }
            *sample = self.read_raw()?;
        }

        Ok(majority(&samples))
    }
}

pub struct ButtonPortEngine {
    sampler: Sampler,
    poll_interval: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ButtonPortEngine {
    pub fn new(io: Arc<dyn PortIo>, port: u16) -> Self {
        Self {
            sampler: Sampler {
                io,
                port,
                shutdown: ShutdownSignal::new(),
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn port(&self) -> u16 {
        self.sampler.port
    }

    /// Single undebounced sample: pressed while bit 0 is clear
    pub fn read_raw(&self) -> Result<bool> {
        self.sampler.read_raw()
    }

    /// Majority vote over three samples spread across 20 ms
    pub fn read_debounced(&self) -> Result<bool> {
        self.sampler.read_debounced()
    }

    /// Start the `panel-copy-button` poller publishing to `bus`
    pub fn start(&self, bus: Arc<ButtonEventBus>) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Err(PanelError::Closed);
        }
        if worker.is_some() {
            return Ok(());
        }

        let sampler = self.sampler.clone();
        let interval = self.poll_interval;
        let handle = thread::Builder::new()
            .name("panel-copy-button".to_string())
            .spawn(move || poll_loop(sampler, interval, bus))?;

        info!("USB copy button polling on port 0x{:x}", self.sampler.port);
        *worker = Some(handle);
        Ok(())
    }

    /// Block until the button is pressed or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout and [`PanelError::Closed`] if the engine
    /// closes while waiting.
    pub fn wait_for_press(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.is_closed() {
                return Err(PanelError::Closed);
            }
            if self.sampler.read_debounced()? {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            if self.sampler.shutdown.wait_timeout(WAIT_TICK.min(deadline - now)) {
                return Err(PanelError::Closed);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sampler.shutdown.is_triggered()
    }

    /// Stop the poller and wake any waiters. Safe to call more than once.
    pub fn close(&self) {
        if !self.sampler.shutdown.trigger() {
            return;
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("USB copy button poller panicked");
            }
        }
        debug!("USB copy button engine closed");
    }
}

impl Drop for ButtonPortEngine {
    fn drop(&mut self) {
        self.close();
    }
}

fn poll_loop(sampler: Sampler, interval: Duration, bus: Arc<ButtonEventBus>) {
    let mut last = false;

    loop {
        match sampler.read_debounced() {
            Ok(pressed) if pressed != last => {
                last = pressed;
                bus.publish(PanelButtonEvent::new(
                    Button::UsbCopy,
                    pressed,
                    ButtonSource::IoPort,
                ));
            }
            Ok(_) => {}
            Err(PanelError::Closed) => break,
            Err(e) => debug!("USB copy button read failed: {}", e),
        }

        if sampler.shutdown.wait_timeout(interval) {
            break;
        }
    }

    debug!("USB copy button poller stopped");
}
