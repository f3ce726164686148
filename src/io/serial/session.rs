// src/io/serial/session.rs
//
// Port session: device configuration and open/close lifecycle.
// A reopen or close always stops and joins the running reader before the
// device handle is released.

use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use super::reader::{ByteReader, SerialDevice};
use super::utils::{
    is_supported_baud_rate, to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, Parity,
};
use crate::error::{Error, Result};
use crate::io::types::ByteStream;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Default read timeout. Bounds how long a stop request can go unnoticed.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Depth of the reader -> consumer byte queue
const EVENT_QUEUE_DEPTH: usize = 4096;

/// How often `close` checks whether the reader has exited
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Serial port configuration. Fixed for the lifetime of an open session.
#[derive(Clone, Debug, PartialEq)]
pub struct PortConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl PortConfig {
    /// 8N1 configuration with the default read timeout
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Result<Self> {
        let config = PortConfig {
            port: port.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }
        self.read_timeout = timeout;
        Ok(self)
    }

    pub fn with_line_settings(mut self, data_bits: u8, stop_bits: u8, parity: Parity) -> Self {
        self.data_bits = data_bits;
        self.stop_bits = stop_bits;
        self.parity = parity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !is_supported_baud_rate(self.baud_rate) {
            return Err(Error::UnsupportedBaudRate(self.baud_rate));
        }
        if self.read_timeout.is_zero() {
            return Err(Error::InvalidTimeout);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "{} at {} baud ({}-{}-{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                Parity::None => 'N',
                Parity::Odd => 'O',
                Parity::Even => 'E',
            },
            self.stop_bits
        )
    }
}

// ============================================================================
// Device Opening
// ============================================================================

/// Opens the device a session reads from
pub trait DeviceOpener: Send {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialDevice>>;
}

/// Opens real ports through the serialport crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl DeviceOpener for SystemOpener {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialDevice>> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .parity(to_serialport_parity(config.parity))
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| Error::DeviceUnavailable {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(port))
    }
}

// ============================================================================
// Port Session
// ============================================================================

pub struct PortSession {
    opener: Box<dyn DeviceOpener>,
    config: Option<PortConfig>,
    reader: Option<ByteReader>,
}

impl Default for PortSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSession {
    pub fn new() -> Self {
        Self::with_opener(Box::new(SystemOpener))
    }

    pub fn with_opener(opener: Box<dyn DeviceOpener>) -> Self {
        PortSession {
            opener,
            config: None,
            reader: None,
        }
    }

    /// Open (or reopen) the port and start reading.
    ///
    /// Any running reader is stopped and joined and the previous device is
    /// released first, even when `config` turns out to be invalid. On failure
    /// the session is left closed.
    pub fn open(&mut self, config: PortConfig) -> Result<ByteStream> {
        self.close();
        config.validate()?;

        let device = match self.opener.open(&config) {
            Ok(d) => d,
            Err(e) => {
                tlog!("[session] {}", e);
                return Err(e);
            }
        };

        let (tx, rx) = std_mpsc::sync_channel(EVENT_QUEUE_DEPTH);
        let reader = ByteReader::start(config.port.clone(), device, tx)?;

        tlog!("[session] Opened {}", config.describe());
        self.config = Some(config);
        self.reader = Some(reader);

        Ok(ByteStream::new(rx))
    }

    /// Reopen the current port at another baud rate, keeping every other
    /// setting. Returns the stream of the new reader.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<ByteStream> {
        let mut config = self.config.clone().ok_or(Error::NotOpen)?;
        config.baud_rate = baud_rate;
        self.open(config)
    }

    /// Stop the reader, wait for it to exit, and release the device.
    /// Closing a closed session does nothing.
    pub fn close(&mut self) {
        let Some(mut reader) = self.reader.take() else {
            self.config = None;
            return;
        };

        let timeout = self
            .config
            .as_ref()
            .map(|c| c.read_timeout)
            .unwrap_or(DEFAULT_READ_TIMEOUT);

        reader.stop();
        let started = Instant::now();
        let mut warned = false;
        while reader.is_running() {
            if !warned && started.elapsed() > timeout * 4 {
                tlog!("[session] Reader still running after {:?}, waiting", started.elapsed());
                warned = true;
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }
        reader.join();

        if let Some(config) = self.config.take() {
            tlog!("[session] Closed {}", config.port);
        }
    }

    /// True while a reader is attached and has not terminated
    pub fn is_open(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| r.is_running())
    }

    pub fn config(&self) -> Option<&PortConfig> {
        self.config.as_ref()
    }

    /// Queue bytes for transmission
    pub fn send(&self, data: &[u8]) -> Result<()> {
        let reader = self.reader.as_ref().ok_or(Error::NotOpen)?;
        if !reader.is_running() {
            return Err(Error::NotOpen);
        }
        reader.send(data.to_vec())
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        self.close();
    }
}
