//! Daemon configuration
//!
//! Loaded from a TOML file. Every section and field has a default, so an
//! empty file (or no file) yields a working configuration for the stock
//! appliance.

use crate::button::DEFAULT_BUTTON_PORT;
use crate::error::{PanelError, Result};
use crate::serial::port::{DEFAULT_DEVICE, DEFAULT_READ_TIMEOUT, PANEL_BAUD};
use crate::serial::PortConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// Device path (e.g., /dev/ttyS1)
    pub device: String,
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: PANEL_BAUD,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
        }
    }
}

/// LCD settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    /// Text shown after initialization, lines separated by `\n`
    pub default_text: String,
    /// Backlight state after initialization
    pub backlight: bool,
    /// Interval between button state requests in milliseconds
    pub button_poll_interval_ms: u64,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            default_text: "System Ready".to_string(),
            backlight: true,
            button_poll_interval_ms: 500,
        }
    }
}

/// USB copy button settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbCopySection {
    pub enabled: bool,
    /// I/O port the button is wired to; 0 disables it
    pub io_port: u16,
    pub poll_interval_ms: u64,
}

impl Default for UsbCopySection {
    fn default() -> Self {
        Self {
            enabled: true,
            io_port: DEFAULT_BUTTON_PORT,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedSection {
    pub enabled: bool,
}

impl Default for LedSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub serial: SerialSection,
    pub display: DisplaySection,
    pub usb_copy: UsbCopySection,
    pub leds: LedSection,
}

impl PanelConfig {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PanelError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PanelConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial.device.trim().is_empty() {
            return Err(PanelError::InvalidConfig(
                "serial.device must not be empty".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(PanelError::InvalidConfig(
                "serial.baud_rate must be positive".to_string(),
            ));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(PanelError::InvalidConfig(
                "serial.read_timeout_ms must be positive".to_string(),
            ));
        }
        if self.display.button_poll_interval_ms == 0 {
            return Err(PanelError::InvalidConfig(
                "display.button_poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.usb_copy.poll_interval_ms == 0 {
            return Err(PanelError::InvalidConfig(
                "usb_copy.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Serial settings as a port configuration
    pub fn port_config(&self) -> PortConfig {
        PortConfig::new(&self.serial.device)
            .with_baud_rate(self.serial.baud_rate)
            .with_timeout(Duration::from_millis(self.serial.read_timeout_ms))
    }

    pub fn button_poll_interval(&self) -> Duration {
        Duration::from_millis(self.display.button_poll_interval_ms)
    }

    pub fn copy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.usb_copy.poll_interval_ms)
    }

    /// Whether the USB copy button should be polled at all
    pub fn usb_copy_active(&self) -> bool {
        self.usb_copy.enabled && self.usb_copy.io_port != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PanelConfig::default();
        assert_eq!(config.serial.device, "/dev/ttyS1");
        assert_eq!(config.serial.baud_rate, 1200);
        assert_eq!(config.usb_copy.io_port, 0xa05);
        assert!(config.usb_copy_active());
        assert!(config.validate().is_ok());

        let port = config.port_config();
        assert_eq!(port.port_path, "/dev/ttyS1");
        assert!(port.is_8n1());
        assert_eq!(port.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = PanelConfig::from_toml_str(
            r#"
            [serial]
            device = "/dev/ttyUSB0"

            [usb_copy]
            io_port = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 1200);
        assert_eq!(config.display.default_text, "System Ready");
        assert!(!config.usb_copy_active());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = PanelConfig::default();
        config.display.default_text = "NAS-01\nOnline".to_string();
        let text = config.to_toml_string().unwrap();
        assert_eq!(PanelConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            PanelConfig::from_toml_str("[serial]\nbaud_rate = 0\n"),
            Err(PanelError::InvalidConfig(_))
        ));
        assert!(matches!(
            PanelConfig::from_toml_str("[serial]\nbaud_rate = \"fast\"\n"),
            Err(PanelError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[leds]\nenabled = false").unwrap();

        let config = PanelConfig::load(file.path()).unwrap();
        assert!(!config.leds.enabled);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            PanelConfig::load(&missing),
            Err(PanelError::ConfigRead { .. })
        ));
    }
}
