//! Unified button event stream
//!
//! Both pollers publish here. The bus keeps the last known state of every
//! button and forwards only real changes to the registered handler, one
//! dispatch lane per source so each poller's events keep their order.

use super::dispatch::{Dispatcher, DEFAULT_QUEUE_DEPTH};
use super::{Button, ButtonSource, PanelButtonEvent};
use log::{debug, trace};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Receiver of button transitions
pub trait ButtonHandler: Send + Sync {
    fn on_button(&self, event: PanelButtonEvent);
}

impl<F> ButtonHandler for F
where
    F: Fn(PanelButtonEvent) + Send + Sync,
{
    fn on_button(&self, event: PanelButtonEvent) {
        self(event)
    }
}

pub struct ButtonEventBus {
    last_state: Mutex<[Option<bool>; 3]>,
    handler: RwLock<Option<Arc<dyn ButtonHandler>>>,
    serial_lane: Dispatcher,
    port_lane: Dispatcher,
}

impl ButtonEventBus {
    /// Create the bus and spawn its dispatch lanes
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            last_state: Mutex::new([None; 3]),
            handler: RwLock::new(None),
            serial_lane: Dispatcher::spawn("panel-dispatch-serial", DEFAULT_QUEUE_DEPTH)?,
            port_lane: Dispatcher::spawn("panel-dispatch-io-port", DEFAULT_QUEUE_DEPTH)?,
        })
    }

    /// Register the handler, replacing any previous one
    pub fn set_handler(&self, handler: Arc<dyn ButtonHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Last state seen for `button`, `None` before the first observation
    pub fn last_state(&self, button: Button) -> Option<bool> {
        self.last_state.lock().unwrap_or_else(PoisonError::into_inner)[button.index()]
    }

    /// Record an observation and forward it if it changes the known state.
    ///
    /// Returns `true` if the event was a change. Changes are dropped rather
    /// than buffered when no handler is registered.
    pub fn publish(&self, event: PanelButtonEvent) -> bool {
        {
            let mut state = self.last_state.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = &mut state[event.button.index()];
            if *slot == Some(event.pressed) {
                trace!("{} unchanged", event);
                return false;
            }
            *slot = Some(event.pressed);
        }

        self.forward(event);
        true
    }

    /// Hand `event` to the handler as-is, leaving the known state untouched.
    ///
    /// Used for synthesized pulses that must reach the handler even when the
    /// button is already recorded in that state.
    pub fn forward(&self, event: PanelButtonEvent) -> bool {
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => {
                debug!("Button event: {}", event);
                self.lane(event.source)
                    .submit(move || handler.on_button(event))
            }
            None => {
                debug!("No button handler registered, dropping {}", event);
                false
            }
        }
    }

    /// Stop both dispatch lanes. Queued events still reach the handler.
    pub fn close(&self) {
        self.serial_lane.shutdown();
        self.port_lane.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.serial_lane.is_shut_down() && self.port_lane.is_shut_down()
    }

    fn lane(&self, source: ButtonSource) -> &Dispatcher {
        match source {
            ButtonSource::Serial => &self.serial_lane,
            ButtonSource::IoPort => &self.port_lane,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn collecting_bus() -> (ButtonEventBus, mpsc::Receiver<PanelButtonEvent>) {
        let bus = ButtonEventBus::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        bus.set_handler(Arc::new(move |event: PanelButtonEvent| {
            let _ = tx.lock().unwrap().send(event);
        }));
        (bus, rx)
    }

    fn press(button: Button, pressed: bool) -> PanelButtonEvent {
        PanelButtonEvent::new(button, pressed, ButtonSource::Serial)
    }

    #[test]
    fn test_first_observation_is_a_change() {
        let (bus, rx) = collecting_bus();
        assert_eq!(bus.last_state(Button::Enter), None);
        assert!(bus.publish(press(Button::Enter, false)));
        assert_eq!(bus.last_state(Button::Enter), Some(false));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            press(Button::Enter, false)
        );
    }

    #[test]
    fn test_repeats_are_suppressed() {
        let (bus, rx) = collecting_bus();
        assert!(bus.publish(press(Button::Select, true)));
        assert!(!bus.publish(press(Button::Select, true)));
        assert!(bus.publish(press(Button::Select, false)));

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(first.pressed);
        assert!(!second.pressed);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_sources_share_state() {
        let (bus, _rx) = collecting_bus();
        assert!(bus.publish(PanelButtonEvent::new(
            Button::UsbCopy,
            true,
            ButtonSource::IoPort
        )));
        assert!(!bus.publish(PanelButtonEvent::new(
            Button::UsbCopy,
            true,
            ButtonSource::Serial
        )));
    }

    #[test]
    fn test_no_handler_drops_but_tracks_state() {
        let bus = ButtonEventBus::new().unwrap();
        assert!(!bus.has_handler());
        assert!(bus.publish(press(Button::Enter, true)));
        assert_eq!(bus.last_state(Button::Enter), Some(true));
    }

    #[test]
    fn test_later_handler_replaces_earlier() {
        let bus = ButtonEventBus::new().unwrap();
        let (old_tx, old_rx) = mpsc::channel();
        let (new_tx, new_rx) = mpsc::channel();
        let old_tx = Mutex::new(old_tx);
        let new_tx = Mutex::new(new_tx);

        bus.set_handler(Arc::new(move |e: PanelButtonEvent| {
            let _ = old_tx.lock().unwrap().send(e);
        }));
        bus.set_handler(Arc::new(move |e: PanelButtonEvent| {
            let _ = new_tx.lock().unwrap().send(e);
        }));

        bus.publish(press(Button::Enter, true));
        assert!(new_rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(old_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_panicking_handler_does_not_stop_lane() {
        let bus = ButtonEventBus::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        bus.set_handler(Arc::new(move |e: PanelButtonEvent| {
            if e.button == Button::Enter {
                panic!("handler failure");
            }
            let _ = tx.lock().unwrap().send(e);
        }));

        bus.publish(press(Button::Enter, true));
        bus.publish(press(Button::Select, true));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap().button,
            Button::Select
        );
    }

    #[test]
    fn test_forward_skips_state_tracking() {
        let (bus, rx) = collecting_bus();
        assert!(bus.publish(press(Button::UsbCopy, true)));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), press(Button::UsbCopy, true));

        assert!(bus.forward(press(Button::UsbCopy, true)));
        assert!(bus.forward(press(Button::UsbCopy, false)));
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().pressed);
        assert!(!rx.recv_timeout(Duration::from_secs(2)).unwrap().pressed);
        assert_eq!(bus.last_state(Button::UsbCopy), Some(true));
    }

    #[test]
    fn test_close() {
        let (bus, rx) = collecting_bus();
        bus.close();
        assert!(bus.is_closed());
        assert!(bus.publish(press(Button::Enter, true)));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
