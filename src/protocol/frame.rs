//! Inbound frame reassembly
//!
//! The panel sends three kinds of traffic, recognized at the front of the
//! buffer in this order:
//!
//! | Bytes                  | Frame                | Consumed |
//! |------------------------|----------------------|----------|
//! | `53 05 00 ss`          | button state         | 4        |
//! | `4D xx xx`             | echo of our command  | 3        |
//! | `55 xx` / `43 xx`      | copy indicator       | 2        |
//!
//! Anything else is dropped one byte at a time. Bytes that could still grow
//! into a frame stay buffered until more data arrives.

use crate::button::Button;
use log::{debug, warn};

const BUTTON_FRAME_HEADER: [u8; 3] = [0x53, 0x05, 0x00];
const BUTTON_FRAME_LEN: usize = 4;
const ECHO_PREFIX: u8 = 0x4D;
const ECHO_LEN: usize = 3;
const COPY_INDICATOR_PREFIXES: [u8; 2] = [0x55, 0x43];
const COPY_INDICATOR_LEN: usize = 2;

/// Buffered bytes allowed after dropping an unrecognized byte
pub const MAX_BUFFERED: usize = 16;

const ENTER_BIT: u8 = 0x01;
const SELECT_BIT: u8 = 0x02;
const USB_COPY_BIT: u8 = 0x04;

/// State byte of a button-state frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState(pub u8);

impl ButtonState {
    /// ENTER and SELECT are active-low, USB_COPY is active-high
    pub fn is_pressed(self, button: Button) -> bool {
        match button {
            Button::Enter => self.0 & ENTER_BIT == 0,
            Button::Select => self.0 & SELECT_BIT == 0,
            Button::UsbCopy => self.0 & USB_COPY_BIT != 0,
        }
    }

    /// Pressed state of every button, in [`Button::ALL`] order
    pub fn buttons(self) -> [(Button, bool); 3] {
        Button::ALL.map(|button| (button, self.is_pressed(button)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    ButtonState(ButtonState),
    /// The controller echoing a command back
    ControllerEcho([u8; ECHO_LEN]),
    /// Two-byte copy-button notice used by some controller firmware
    CopyIndicator(u8),
}

/// Unparsed inbound bytes, owned by the display reader
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    overflows: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Times the buffer was discarded to resynchronize
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Pull the next complete frame off the front of the buffer.
    ///
    /// Returns `None` when the buffer is empty or holds only the start of a
    /// frame.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let first = *self.buf.first()?;

            if first == BUTTON_FRAME_HEADER[0] && self.could_be_button_frame() {
                if self.buf.len() < BUTTON_FRAME_LEN {
                    return None;
                }
                let state = self.buf[3];
                self.buf.drain(..BUTTON_FRAME_LEN);
                return Some(Frame::ButtonState(ButtonState(state)));
            }

            if first == ECHO_PREFIX {
                if self.buf.len() < ECHO_LEN {
                    return None;
                }
                let echo = [self.buf[0], self.buf[1], self.buf[2]];
                self.buf.drain(..ECHO_LEN);
                return Some(Frame::ControllerEcho(echo));
            }

            if COPY_INDICATOR_PREFIXES.contains(&first) {
                if self.buf.len() < COPY_INDICATOR_LEN {
                    return None;
                }
                self.buf.drain(..COPY_INDICATOR_LEN);
                return Some(Frame::CopyIndicator(first));
            }

            self.buf.remove(0);
            debug!("Dropped unrecognized byte 0x{:02x}", first);

            if self.buf.len() > MAX_BUFFERED {
                warn!(
                    "Frame buffer desynchronized, discarding {} bytes",
                    self.buf.len()
                );
                self.buf.clear();
                self.overflows += 1;
                return None;
            }
        }
    }

    /// Every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Whether the buffered bytes match the button frame header so far
    fn could_be_button_frame(&self) -> bool {
        self.buf
            .iter()
            .zip(BUTTON_FRAME_HEADER.iter())
            .all(|(got, want)| got == want)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_state_bits() {
        let idle = ButtonState(0xFF);
        assert!(!idle.is_pressed(Button::Enter));
        assert!(!idle.is_pressed(Button::Select));
        assert!(idle.is_pressed(Button::UsbCopy));

        let enter = ButtonState(0xFE);
        assert!(enter.is_pressed(Button::Enter));
        assert!(!enter.is_pressed(Button::Select));

        let select_no_copy = ButtonState(0x01);
        assert!(!select_no_copy.is_pressed(Button::Enter));
        assert!(select_no_copy.is_pressed(Button::Select));
        assert!(!select_no_copy.is_pressed(Button::UsbCopy));
    }

    #[test]
    fn test_single_frame() {
        let mut fb = FrameBuffer::new();
        fb.extend(&[0x53, 0x05, 0x00, 0xFE]);
        assert_eq!(fb.next_frame(), Some(Frame::ButtonState(ButtonState(0xFE))));
        assert_eq!(fb.next_frame(), None);
        assert!(fb.is_empty());
    }

    #[test]
    fn test_split_frame_at_every_point() {
        let frame = [0x53, 0x05, 0x00, 0xFD];
        for split in 1..frame.len() {
            let mut fb = FrameBuffer::new();
            fb.extend(&frame[..split]);
            assert_eq!(fb.next_frame(), None, "split at {split}");
            assert_eq!(fb.len(), split);
            fb.extend(&frame[split..]);
            assert_eq!(
                fb.drain_frames(),
                vec![Frame::ButtonState(ButtonState(0xFD))],
                "split at {split}"
            );
        }
    }

    #[test]
    fn test_echo_and_copy_indicator() {
        let mut fb = FrameBuffer::new();
        fb.extend(&[0x4D, 0x0C, 0x00, 0x55, 0x01, 0x43]);
        assert_eq!(
            fb.next_frame(),
            Some(Frame::ControllerEcho([0x4D, 0x0C, 0x00]))
        );
        assert_eq!(fb.next_frame(), Some(Frame::CopyIndicator(0x55)));
        // 0x43 alone waits for its second byte.
        assert_eq!(fb.next_frame(), None);
        assert_eq!(fb.len(), 1);
        fb.extend(&[0x00]);
        assert_eq!(fb.next_frame(), Some(Frame::CopyIndicator(0x43)));
    }

    #[test]
    fn test_short_echo_waits() {
        let mut fb = FrameBuffer::new();
        fb.extend(&[0x4D, 0x05]);
        assert_eq!(fb.next_frame(), None);
        assert_eq!(fb.len(), 2);
    }

    #[test]
    fn test_noise_before_frame_is_skipped() {
        let mut fb = FrameBuffer::new();
        fb.extend(&[0x00, 0x11, 0x53, 0x99, 0x53, 0x05, 0x00, 0xFB]);
        assert_eq!(
            fb.drain_frames(),
            vec![Frame::ButtonState(ButtonState(0xFB))]
        );
        assert!(fb.is_empty());
    }

    #[test]
    fn test_garbage_overflow_clears_buffer() {
        let mut fb = FrameBuffer::new();
        fb.extend(&[0x00; 20]);
        assert_eq!(fb.next_frame(), None);
        assert!(fb.is_empty());
        assert_eq!(fb.overflows(), 1);
    }

    #[test]
    fn test_repeated_frames_all_decode() {
        let mut fb = FrameBuffer::new();
        for _ in 0..3 {
            fb.extend(&[0x53, 0x05, 0x00, 0xFE]);
        }
        assert_eq!(fb.drain_frames().len(), 3);
    }
}
