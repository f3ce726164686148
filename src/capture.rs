// src/capture.rs
//
// Raw capture of every received byte, independent of the display mode.
// Export is a plain byte dump with no header or framing.

use std::path::Path;

use crate::error::Result;

#[derive(Debug, Default, Clone)]
pub struct RawCapture {
    bytes: Vec<u8>,
}

impl RawCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn reset(&mut self) {
        self.bytes = Vec::new();
    }

    /// Write the whole capture to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        tlog!("[capture] Saved {} bytes to {}", self.bytes.len(), path.display());
        Ok(())
    }
}
