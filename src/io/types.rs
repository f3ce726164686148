// src/io/types.rs
//
// Shared types for the reader thread and its consumer.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Reader Events
// ============================================================================

/// Message from the reader thread to the consumer.
/// Bytes are sent one per event, in the order they were read.
#[derive(Clone, Debug, PartialEq)]
pub enum ReaderEvent {
    /// A single byte arrived from the device
    Byte(u8),
    /// The device failed; the reader has stopped (port, reason)
    Failed(String, String),
}

/// Consumer end of the reader channel, returned by `PortSession::open`.
pub struct ByteStream {
    rx: std_mpsc::Receiver<ReaderEvent>,
}

impl ByteStream {
    pub(crate) fn new(rx: std_mpsc::Receiver<ReaderEvent>) -> Self {
        Self { rx }
    }

    /// Next event if one is ready. `Ok(None)` when nothing is pending.
    /// Returns `NotOpen` once the reader has gone away and the queue is empty.
    pub fn try_next(&self) -> Result<Option<ReaderEvent>> {
        match self.rx.try_recv() {
            Ok(ev) => Ok(Some(ev)),
            Err(std_mpsc::TryRecvError::Empty) => Ok(None),
            Err(std_mpsc::TryRecvError::Disconnected) => Err(Error::NotOpen),
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<ReaderEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Ok(Some(ev)),
            Err(std_mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(Error::NotOpen),
        }
    }
}

// ============================================================================
// Transmit Types
// ============================================================================

/// Bytes queued for the reader thread to write between reads
pub struct TransmitRequest {
    pub data: Vec<u8>,
}

/// Sender type for transmit requests
pub type TransmitSender = std_mpsc::SyncSender<TransmitRequest>;
