// src/io/serial/mock.rs
//
// In-memory serial line for tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::reader::SerialDevice;
use super::session::{DeviceOpener, PortConfig};
use crate::error::{Error, Result};

#[derive(Default)]
struct MockLineInner {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    unplugged: bool,
}

/// Test-side handle to a simulated serial line
#[derive(Clone)]
pub struct MockLine {
    inner: Arc<Mutex<MockLineInner>>,
    timeout: Duration,
}

impl MockLine {
    pub fn new(timeout: Duration) -> Self {
        MockLine {
            inner: Arc::new(Mutex::new(MockLineInner::default())),
            timeout,
        }
    }

    /// Device end, handed to the reader
    pub fn device(&self) -> MockDevice {
        MockDevice { line: self.clone() }
    }

    /// Make bytes available to the device
    pub fn inject(&self, data: &[u8]) {
        self.inner.lock().unwrap().inbound.extend(data);
    }

    /// Bytes not yet read
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().inbound.len()
    }

    /// Everything written to the device so far
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Simulate the device disappearing
    pub fn unplug(&self) {
        self.inner.lock().unwrap().unplugged = true;
    }
}

pub struct MockDevice {
    line: MockLine,
}

impl Read for MockDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut inner = self.line.inner.lock().unwrap();
            if inner.unplugged {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device removed"));
            }
            let available = inner.inbound.len().min(buf.len());
            if available > 0 {
                for item in buf.iter_mut().take(available) {
                    *item = inner.inbound.pop_front().unwrap();
                }
                return Ok(available);
            }
        }
        std::thread::sleep(self.line.timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"))
    }
}

impl Write for MockDevice {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut inner = self.line.inner.lock().unwrap();
        if inner.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device removed"));
        }
        inner.written.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opener that hands out devices on a shared mock line
pub struct MockOpener {
    pub line: MockLine,
    /// Cleared to make later opens fail
    pub available: Arc<AtomicBool>,
    pub opens: Arc<AtomicUsize>,
}

impl MockOpener {
    pub fn new(line: MockLine) -> Self {
        MockOpener {
            line,
            available: Arc::new(AtomicBool::new(true)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl DeviceOpener for MockOpener {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialDevice>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable {
                port: config.port.clone(),
                reason: "No such file or directory".to_string(),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.line.device()))
    }
}
