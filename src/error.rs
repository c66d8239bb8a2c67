//! Error types for panel control
//!
//! Errors fall into four groups: fatal at construction (the serial link
//! cannot open), degraded feature (privileged port access unavailable),
//! transient I/O (absorbed by the polling loops) and caller errors.

use std::path::PathBuf;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    /// The serial device could not be opened or configured
    #[error("failed to open serial port {device}: {source}")]
    SerialOpen {
        device: String,
        #[source]
        source: serialport::Error,
    },

    /// The device accepted fewer bytes than requested
    #[error("incomplete write: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Privileged port access was refused
    #[error("I/O port 0x{base:x} unavailable: {reason}")]
    PortPermission { base: u16, reason: String },

    /// Port I/O is not available on this platform
    #[error("I/O port access is not supported on this platform")]
    PortUnsupported,

    /// The port grant was already released
    #[error("I/O port 0x{port:x} accessed after release")]
    PortReleased { port: u16 },

    #[error("invalid row: {0} (must be 0 or 1)")]
    InvalidRow(usize),

    #[error("invalid disk number: {0} (must be 1-6)")]
    InvalidDisk(usize),

    #[error("unknown LED: {0}")]
    UnknownLed(String),

    /// Operation attempted on a closed controller or engine
    #[error("panel controller is closed")]
    Closed,

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PanelError {
    /// Errors caused by the caller passing bad arguments or using a closed handle
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PanelError::InvalidRow(_)
                | PanelError::InvalidDisk(_)
                | PanelError::UnknownLed(_)
                | PanelError::Closed
        )
    }

    /// Errors the polling loops absorb and retry
    pub fn is_transient(&self) -> bool {
        match self {
            PanelError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors() {
        assert!(PanelError::InvalidDisk(7).is_caller_error());
        assert!(PanelError::InvalidRow(2).is_caller_error());
        assert!(PanelError::Closed.is_caller_error());
        assert!(!PanelError::PortUnsupported.is_caller_error());
    }

    #[test]
    fn test_transient_io() {
        let timeout = PanelError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t"));
        let broken = PanelError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "b"));
        assert!(timeout.is_transient());
        assert!(!broken.is_transient());
    }

    #[test]
    fn test_messages() {
        let err = PanelError::ShortWrite {
            written: 3,
            expected: 20,
        };
        assert_eq!(err.to_string(), "incomplete write: wrote 3 of 20 bytes");
        assert_eq!(
            PanelError::InvalidDisk(0).to_string(),
            "invalid disk number: 0 (must be 1-6)"
        );
    }
}
