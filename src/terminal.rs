// src/terminal.rs
//
// Consumer side of the pipeline. Every received byte is captured, then
// rendered directly or passed through the packet framer depending on the
// mode. Keystrokes are turned into bytes to transmit and optionally echoed.
//
// A Terminal is driven from a single thread; it holds no locks.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::capture::RawCapture;
use crate::error::{Error, Result};
use crate::io::serial::{DecodeEvent, DecoderState, FrameDecoder, NullCodec, PacketCodec};
use crate::io::{ByteStream, ReaderEvent};
use crate::render::{NewlineCode, RenderMode, Renderer};

// ============================================================================
// Display Sink
// ============================================================================

/// Where rendered output goes. Only `append_text` is required.
pub trait DisplaySink {
    fn append_text(&mut self, text: &str);

    /// Drop everything displayed so far
    fn clear(&mut self) {}

    /// A packet passed its checksum. Its text is also appended.
    fn packet_decoded(&mut self, _body: &[u8], _text: &str) {}

    /// A packet failed its checksum. The error marker is also appended.
    fn checksum_failed(&mut self, _expected: u8, _received: u8) {}
}

impl DisplaySink for String {
    fn append_text(&mut self, text: &str) {
        self.push_str(text);
    }

    fn clear(&mut self) {
        String::clear(self);
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    pub mode: RenderMode,
    pub newline: NewlineCode,
    pub local_echo: bool,
    /// Never write to the device
    pub rx_only: bool,
}

// ============================================================================
// Terminal
// ============================================================================

pub struct Terminal {
    config: TerminalConfig,
    capture: RawCapture,
    decoder: FrameDecoder,
    renderer: Renderer,
}

impl Terminal {
    /// Terminal with the default (sentinel) packet codec
    pub fn new(config: TerminalConfig) -> Self {
        Self::with_codec(config, Box::new(NullCodec))
    }

    pub fn with_codec(config: TerminalConfig, codec: Box<dyn PacketCodec + Send>) -> Self {
        Terminal {
            config,
            capture: RawCapture::new(),
            decoder: FrameDecoder::new(codec),
            renderer: Renderer::new(config.mode, config.newline),
        }
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn mode(&self) -> RenderMode {
        self.config.mode
    }

    pub fn capture(&self) -> &RawCapture {
        &self.capture
    }

    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Process one received byte
    pub fn handle_byte(&mut self, byte: u8, sink: &mut dyn DisplaySink) {
        self.capture.push(byte);

        if self.config.mode != RenderMode::Protocol {
            let text = self.renderer.render_byte(byte);
            sink.append_text(&text);
            return;
        }

        let Some(event) = self.decoder.feed(byte) else {
            return;
        };
        match &event {
            DecodeEvent::Packet { body, text } => sink.packet_decoded(body, text),
            DecodeEvent::ChecksumMismatch { expected, received, .. } => {
                sink.checksum_failed(*expected, *received)
            }
            DecodeEvent::PassThrough(_) => {}
        }
        let text = self.renderer.render_decode_event(&event);
        if !text.is_empty() {
            sink.append_text(&text);
        }
    }

    /// Process one reader event. A device failure is returned as `ReadFailure`.
    pub fn handle_event(&mut self, event: ReaderEvent, sink: &mut dyn DisplaySink) -> Result<()> {
        match event {
            ReaderEvent::Byte(byte) => {
                self.handle_byte(byte, sink);
                Ok(())
            }
            ReaderEvent::Failed(port, reason) => Err(Error::ReadFailure { port, reason }),
        }
    }

    /// Process up to `max` pending events without blocking.
    /// Returns how many were handled.
    pub fn drain(&mut self, stream: &ByteStream, sink: &mut dyn DisplaySink, max: usize) -> Result<usize> {
        let mut handled = 0;
        while handled < max {
            match stream.try_next()? {
                Some(event) => {
                    self.handle_event(event, sink)?;
                    handled += 1;
                }
                None => break,
            }
        }
        Ok(handled)
    }

    /// A key was typed. Returns the byte to transmit, or `None` in
    /// receive-only mode. Echoes the key when local echo is on.
    pub fn key_pressed(&mut self, key: u8, sink: &mut dyn DisplaySink) -> Option<u8> {
        if self.config.rx_only {
            return None;
        }
        if self.config.local_echo {
            let text = self.renderer.render_echo(key);
            sink.append_text(&text);
        }
        Some(key)
    }

    /// Switch display mode. The capture and the framer state are untouched.
    pub fn set_mode(&mut self, mode: RenderMode, sink: &mut dyn DisplaySink) {
        self.config.mode = mode;
        let text = self.renderer.set_mode(mode);
        if !text.is_empty() {
            sink.append_text(&text);
        }
        tlog!("[terminal] Mode set to {}", mode);
    }

    /// Set the newline code from its byte value; only 0x0A and 0x0D are accepted
    pub fn set_newline(&mut self, code: u8) -> Result<()> {
        let newline = NewlineCode::try_from(code)?;
        self.config.newline = newline;
        self.renderer.set_newline(newline);
        Ok(())
    }

    pub fn set_local_echo(&mut self, enabled: bool) {
        self.config.local_echo = enabled;
    }

    pub fn set_rx_only(&mut self, enabled: bool) {
        self.config.rx_only = enabled;
    }

    /// Clear the display. The capture is kept.
    pub fn clear(&mut self, sink: &mut dyn DisplaySink) {
        sink.clear();
    }

    /// Drop the capture and clear the display
    pub fn reset_data(&mut self, sink: &mut dyn DisplaySink) {
        self.capture.reset();
        sink.clear();
        tlog!("[terminal] Capture reset");
    }

    pub fn save_capture(&self, path: &Path) -> Result<()> {
        self.capture.save(path)
    }
}
