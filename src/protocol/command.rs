//! Outgoing LCD commands

use crate::error::{PanelError, Result};

/// Characters per LCD line
pub const LCD_WIDTH: usize = 16;

/// Lines on the LCD
pub const LCD_ROWS: usize = 2;

/// Leading byte of every command sent to the panel
pub const CMD_PREFIX: u8 = 0x4D;

const CMD_WRITE_LINE: u8 = 0x0C;
const CMD_BACKLIGHT: u8 = 0x5E;
const CMD_ENABLE_REPORTING: u8 = 0x06;
const CMD_REQUEST_STATE: u8 = 0x05;
const WRITE_LINE_LENGTH: u8 = 0x10;

/// Cells between the brackets of the progress bar
const PROGRESS_CELLS: usize = LCD_WIDTH - 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace one LCD line with exactly 16 characters
    WriteLine { row: u8, text: [u8; LCD_WIDTH] },
    Backlight(bool),
    /// Ask the panel to push button-state frames on its own
    EnableButtonReporting,
    /// Ask the panel for one button-state frame
    RequestButtonState,
}

impl Command {
    /// Build a line write, padding or truncating `text` to the LCD width
    pub fn write_line(row: usize, text: &str) -> Result<Self> {
        if row >= LCD_ROWS {
            return Err(PanelError::InvalidRow(row));
        }
        Ok(Command::WriteLine {
            row: row as u8,
            text: format_line(text),
        })
    }

    /// Wire encoding of the command
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::WriteLine { row, text } => {
                let mut bytes = Vec::with_capacity(4 + LCD_WIDTH);
                bytes.extend_from_slice(&[CMD_PREFIX, CMD_WRITE_LINE, *row, WRITE_LINE_LENGTH]);
                bytes.extend_from_slice(text);
                bytes
            }
            Command::Backlight(on) => vec![CMD_PREFIX, CMD_BACKLIGHT, u8::from(*on)],
            Command::EnableButtonReporting => vec![CMD_PREFIX, CMD_ENABLE_REPORTING],
            Command::RequestButtonState => vec![CMD_PREFIX, CMD_REQUEST_STATE],
        }
    }
}

/// Render `text` as one LCD line.
///
/// Characters outside printable ASCII become `?`. Short text is padded with
/// spaces, long text is cut at the LCD width.
pub fn format_line(text: &str) -> [u8; LCD_WIDTH] {
    let mut line = [b' '; LCD_WIDTH];
    for (slot, ch) in line.iter_mut().zip(text.chars()) {
        *slot = if ch.is_ascii_graphic() || ch == ' ' {
            ch as u8
        } else {
            b'?'
        };
    }
    line
}

/// Split text on newlines into the two LCD lines.
///
/// A missing second line is blank; lines past the second are ignored.
pub fn split_lines(text: &str) -> [&str; LCD_ROWS] {
    let mut lines = text.split('\n');
    let first = lines.next().unwrap_or("");
    let second = lines.next().unwrap_or("");
    [first, second]
}

/// A `[====      ]` bar filling one line, for a percentage clamped to 0..=100
pub fn progress_bar(percent: u8) -> String {
    let percent = usize::from(percent.min(100));
    let filled = percent * PROGRESS_CELLS / 100;

    let mut bar = String::with_capacity(LCD_WIDTH);
    bar.push('[');
    bar.extend(std::iter::repeat('=').take(filled));
    bar.extend(std::iter::repeat(' ').take(PROGRESS_CELLS - filled));
    bar.push(']');
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_line_encoding() {
        let cmd = Command::write_line(1, "READY").unwrap();
        let bytes = cmd.encode();
        assert_eq!(&bytes[..4], &[0x4D, 0x0C, 0x01, 0x10]);
        assert_eq!(&bytes[4..], b"READY           ");
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn test_write_line_rejects_bad_row() {
        assert!(matches!(
            Command::write_line(2, "x"),
            Err(PanelError::InvalidRow(2))
        ));
    }

    #[test]
    fn test_fixed_commands() {
        assert_eq!(Command::Backlight(true).encode(), vec![0x4D, 0x5E, 0x01]);
        assert_eq!(Command::Backlight(false).encode(), vec![0x4D, 0x5E, 0x00]);
        assert_eq!(Command::EnableButtonReporting.encode(), vec![0x4D, 0x06]);
        assert_eq!(Command::RequestButtonState.encode(), vec![0x4D, 0x05]);
    }

    #[test]
    fn test_format_line() {
        assert_eq!(&format_line("0123456789ABCDEFGHIJ"), b"0123456789ABCDEF");
        assert_eq!(&format_line("caf\u{e9}\t!"), b"caf??!          ");
        assert_eq!(&format_line(""), &[b' '; LCD_WIDTH]);
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("one"), ["one", ""]);
        assert_eq!(split_lines("one\ntwo"), ["one", "two"]);
        assert_eq!(split_lines("one\ntwo\nthree"), ["one", "two"]);
        assert_eq!(split_lines(""), ["", ""]);
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), "[              ]");
        assert_eq!(progress_bar(50), "[=======       ]");
        assert_eq!(progress_bar(100), "[==============]");
        assert_eq!(progress_bar(250), "[==============]");
        assert_eq!(progress_bar(33).len(), LCD_WIDTH);
    }
}
