//! 16x2 LCD over the panel's serial link

pub mod engine;

pub use engine::{DisplayProtocolEngine, COPY_INDICATOR_PULSE, DEFAULT_BUTTON_POLL_INTERVAL};
