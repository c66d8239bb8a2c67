//! Front-panel serial protocol
//!
//! Outgoing commands all start with `0x4D`. Incoming traffic is a byte
//! stream that [`FrameBuffer`] reassembles into [`Frame`]s.

pub mod command;
pub mod frame;

pub use command::{format_line, progress_bar, split_lines, Command, LCD_ROWS, LCD_WIDTH};
pub use frame::{ButtonState, Frame, FrameBuffer, MAX_BUFFERED};
