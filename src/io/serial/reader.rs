// src/io/serial/reader.rs
//
// Background byte reader.
// Owns the device handle on a dedicated thread, performs timed reads and
// forwards every byte, one event per byte, to the consumer channel. Queued
// transmit requests are written between reads so the handle never has two
// users.

use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc as std_mpsc;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::io::types::{ReaderEvent, TransmitRequest, TransmitSender};

// ============================================================================
// Types and Configuration
// ============================================================================

/// Depth of the transmit queue
const TRANSMIT_QUEUE_DEPTH: usize = 32;

/// Back-off while the consumer queue is full
const DELIVERY_RETRY: Duration = Duration::from_millis(1);

/// Anything the reader can read from and write to.
/// `Box<dyn serialport::SerialPort>` satisfies this, as do in-memory test lines.
pub trait SerialDevice: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> SerialDevice for T {}

// ============================================================================
// Byte Reader
// ============================================================================

/// Handle to a running reader thread.
///
/// `stop` only raises a flag. The thread notices it within one read timeout;
/// poll `is_running` (or call `join`) before releasing the device.
pub struct ByteReader {
    port: String,
    keep_going: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    transmit_tx: TransmitSender,
    task_handle: Option<JoinHandle<()>>,
}

impl ByteReader {
    /// Spawn the reader thread against an open device.
    pub fn start(
        port: String,
        device: Box<dyn SerialDevice>,
        sink: std_mpsc::SyncSender<ReaderEvent>,
    ) -> Result<Self> {
        let keep_going = Arc::new(AtomicBool::new(true));
        let running = Arc::new(AtomicBool::new(true));
        let (transmit_tx, transmit_rx) = std_mpsc::sync_channel::<TransmitRequest>(TRANSMIT_QUEUE_DEPTH);

        let handle = {
            let port = port.clone();
            let keep_going = keep_going.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name(format!("serial-reader {}", port))
                .spawn(move || run_reader_blocking(port, device, sink, keep_going, running, transmit_rx))
        };

        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                running.store(false, Ordering::Release);
                return Err(Error::Io(e));
            }
        };

        Ok(ByteReader {
            port,
            keep_going,
            running,
            transmit_tx,
            task_handle: Some(handle),
        })
    }

    /// Ask the thread to finish. Does not wait.
    pub fn stop(&self) {
        self.keep_going.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the thread to exit. Call `stop` first.
    pub fn join(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            if handle.join().is_err() {
                tlog!("[serial:{}] Reader thread panicked", self.port);
                self.running.store(false, Ordering::Release);
            }
        }
    }

    /// Queue bytes for the reader thread to write.
    pub fn send(&self, data: Vec<u8>) -> Result<()> {
        self.transmit_tx
            .try_send(TransmitRequest { data })
            .map_err(|e| match e {
                std_mpsc::TrySendError::Full(_) => {
                    Error::Io(std::io::Error::new(ErrorKind::WouldBlock, "transmit queue full"))
                }
                std_mpsc::TrySendError::Disconnected(_) => Error::NotOpen,
            })
    }
}

impl Drop for ByteReader {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

// ============================================================================
// Reader Loop
// ============================================================================

/// Hand an event to the consumer without dropping it. Returns false if the
/// event could not be delivered because of a stop request or a closed channel.
fn deliver(sink: &std_mpsc::SyncSender<ReaderEvent>, mut event: ReaderEvent, keep_going: &AtomicBool) -> bool {
    loop {
        match sink.try_send(event) {
            Ok(()) => return true,
            Err(std_mpsc::TrySendError::Full(ev)) => {
                if !keep_going.load(Ordering::Acquire) {
                    return false;
                }
                event = ev;
                std::thread::sleep(DELIVERY_RETRY);
            }
            Err(std_mpsc::TrySendError::Disconnected(_)) => return false,
        }
    }
}

fn run_reader_blocking(
    port: String,
    mut device: Box<dyn SerialDevice>,
    sink: std_mpsc::SyncSender<ReaderEvent>,
    keep_going: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
) {
    let mut buf = [0u8; 1];
    let mut total_bytes_read: u64 = 0;

    let stream_reason = loop {
        if !keep_going.load(Ordering::Acquire) {
            break "stopped";
        }

        // Process pending transmit requests (non-blocking)
        while let Ok(req) = transmit_rx.try_recv() {
            if let Err(e) = device.write_all(&req.data).and_then(|_| device.flush()) {
                tlog!("[serial:{}] Write error: {}", port, e);
            }
        }

        match device.read(&mut buf) {
            Ok(n) if n > 0 => {
                total_bytes_read += 1;
                if !deliver(&sink, ReaderEvent::Byte(buf[0]), &keep_going) {
                    break "stopped";
                }
            }
            Ok(_) => {
                // No data within the timeout
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                tlog!("[serial:{}] Read error: {}", port, e);
                deliver(&sink, ReaderEvent::Failed(port.clone(), e.to_string()), &keep_going);
                break "error";
            }
        }
    };

    running.store(false, Ordering::Release);
    tlog!(
        "[serial:{}] Reader ended ({}) after {} bytes",
        port,
        stream_reason,
        total_bytes_read
    );
}
