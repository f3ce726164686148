// src/error.rs
//
// Error types for the serial terminal core.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// uartscope error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device could not be opened (missing, no permission, already claimed)
    #[error("Failed to open {port}: {reason}")]
    DeviceUnavailable { port: String, reason: String },

    /// The device failed mid-session; the reader has terminated
    #[error("Read error on {port}: {reason}")]
    ReadFailure { port: String, reason: String },

    /// Operation requires an open port
    #[error("Port is not open")]
    NotOpen,

    /// Baud rate outside the recognised set
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// Read timeout must be non-zero so a stop request is observed
    #[error("Read timeout must be greater than zero")]
    InvalidTimeout,

    /// Newline code other than LF (0x0A) or CR (0x0D)
    #[error("Invalid newline code: {0:#04x}")]
    InvalidNewline(u8),

    /// Unknown render mode name
    #[error("Unknown terminal mode: {0}")]
    InvalidMode(String),

    /// I/O error (capture export, log file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed or written
    #[error("Settings error: {0}")]
    Settings(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Settings(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Settings(e.to_string())
    }
}
