use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::io::serial::{Parity, PortConfig};
use crate::render::{NewlineCode, RenderMode};
use crate::terminal::TerminalConfig;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TerminalSettings {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64, // must be > 0 so the reader notices stop requests
    #[serde(default)]
    pub mode: RenderMode, // "ascii" | "hex" | "protocol"
    #[serde(default)]
    pub newline: NewlineCode, // "lf" | "cr"
    #[serde(default)]
    pub local_echo: bool,
    #[serde(default)]
    pub rx_only: bool,
    #[serde(default = "default_capture_path")]
    pub capture_path: PathBuf,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_baud_rate() -> u32 {
    115200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_capture_path() -> PathBuf {
    PathBuf::from("uartscope.dat")
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            mode: RenderMode::default(),
            newline: NewlineCode::default(),
            local_echo: false,
            rx_only: false,
            capture_path: default_capture_path(),
            log_dir: None,
        }
    }
}

impl TerminalSettings {
    /// `<config dir>/uartscope/settings.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("uartscope").join("settings.toml"))
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tlog!("[settings] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: TerminalSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tlog!("[settings] Saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(Error::InvalidTimeout);
        }
        if !crate::io::serial::utils::is_supported_baud_rate(self.baud_rate) {
            return Err(Error::UnsupportedBaudRate(self.baud_rate));
        }
        Ok(())
    }

    /// Port configuration for opening a session. Requires `port` to be set.
    pub fn port_config(&self) -> Result<PortConfig> {
        let port = self
            .port
            .as_deref()
            .ok_or_else(|| Error::Settings("No serial port configured".to_string()))?;

        Ok(PortConfig::new(port, self.baud_rate)?
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))?
            .with_line_settings(self.data_bits, self.stop_bits, self.parity))
    }

    pub fn terminal_config(&self) -> TerminalConfig {
        TerminalConfig {
            mode: self.mode,
            newline: self.newline,
            local_echo: self.local_echo,
            rx_only: self.rx_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings = TerminalSettings::from_toml(
            r#"
            port = "/dev/ttyACM0"
            mode = "protocol"
            newline = "cr"
            "#,
        )
        .unwrap();

        assert_eq!(settings.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(settings.mode, RenderMode::Protocol);
        assert_eq!(settings.newline, NewlineCode::Cr);
        assert_eq!(settings.baud_rate, 115200);
        assert_eq!(settings.read_timeout_ms, 100);
        assert_eq!(settings.capture_path, PathBuf::from("uartscope.dat"));
        assert!(!settings.rx_only);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            TerminalSettings::from_toml("newline = \"crlf\""),
            Err(Error::Settings(_))
        ));
        assert!(matches!(
            TerminalSettings::from_toml("baud_rate = 57800"),
            Err(Error::UnsupportedBaudRate(57800))
        ));
        assert!(matches!(
            TerminalSettings::from_toml("read_timeout_ms = 0"),
            Err(Error::InvalidTimeout)
        ));
    }

    #[test]
    fn test_port_config() {
        let mut settings = TerminalSettings::default();
        assert!(matches!(settings.port_config(), Err(Error::Settings(_))));

        settings.port = Some("COM3".to_string());
        settings.baud_rate = 9600;
        settings.parity = Parity::Even;
        settings.read_timeout_ms = 250;

        let config = settings.port_config().unwrap();
        assert_eq!(config.port, "COM3");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("uartscope-settings-{}", std::process::id()))
            .join("settings.toml");

        let settings = TerminalSettings {
            port: Some("/dev/ttyUSB1".to_string()),
            mode: RenderMode::Hex,
            local_echo: true,
            ..TerminalSettings::default()
        };
        settings.save(&path).unwrap();

        assert_eq!(TerminalSettings::load(&path).unwrap(), settings);
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("uartscope-definitely-missing.toml");
        assert_eq!(TerminalSettings::load(&path).unwrap(), TerminalSettings::default());
    }
}
