// src/render.rs
//
// Byte-to-text rendering for the three terminal modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::io::serial::DecodeEvent;

/// Text appended when a packet fails its checksum
pub const CHECKSUM_ERROR_MARKER: &str = "Checksum Error\n";

/// Hex mode: bytes per half line and per line
const HEX_COLUMN: u8 = 8;
const HEX_LINE: u8 = 16;

// ============================================================================
// Types
// ============================================================================

/// Terminal display mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Ascii,
    Hex,
    Protocol,
}

impl RenderMode {
    pub const ALL: [RenderMode; 3] = [RenderMode::Ascii, RenderMode::Hex, RenderMode::Protocol];

    /// Following mode in display order, wrapping around
    pub fn next(self) -> Self {
        match self {
            RenderMode::Ascii => RenderMode::Hex,
            RenderMode::Hex => RenderMode::Protocol,
            RenderMode::Protocol => RenderMode::Ascii,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RenderMode::Ascii => "ASCII",
            RenderMode::Hex => "Hex",
            RenderMode::Protocol => "Protocol",
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RenderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascii" => Ok(RenderMode::Ascii),
            "hex" => Ok(RenderMode::Hex),
            "protocol" => Ok(RenderMode::Protocol),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

/// Byte that marks a line break in the received stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewlineCode {
    /// 0x0A
    #[default]
    Lf,
    /// 0x0D
    Cr,
}

impl NewlineCode {
    pub fn byte(self) -> u8 {
        match self {
            NewlineCode::Lf => 0x0A,
            NewlineCode::Cr => 0x0D,
        }
    }

    /// The other newline code
    pub fn toggled(self) -> Self {
        match self {
            NewlineCode::Lf => NewlineCode::Cr,
            NewlineCode::Cr => NewlineCode::Lf,
        }
    }
}

impl TryFrom<u8> for NewlineCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x0A => Ok(NewlineCode::Lf),
            0x0D => Ok(NewlineCode::Cr),
            other => Err(Error::InvalidNewline(other)),
        }
    }
}

impl FromStr for NewlineCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lf" | "0x0a" => Ok(NewlineCode::Lf),
            "cr" | "0x0d" => Ok(NewlineCode::Cr),
            _ => Err(Error::Settings(format!("Unknown newline code: {}", s))),
        }
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Turns received bytes into display text according to the active mode.
/// Holds only mode-local state (the hex alignment counter).
#[derive(Debug, Clone)]
pub struct Renderer {
    mode: RenderMode,
    newline: NewlineCode,
    hex_counter: u8,
}

impl Renderer {
    pub fn new(mode: RenderMode, newline: NewlineCode) -> Self {
        Renderer {
            mode,
            newline,
            hex_counter: 0,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn newline(&self) -> NewlineCode {
        self.newline
    }

    pub fn set_newline(&mut self, newline: NewlineCode) {
        self.newline = newline;
    }

    /// Switch mode and reset mode-local counters.
    /// Returns text to append; selecting hex starts on a fresh line.
    pub fn set_mode(&mut self, mode: RenderMode) -> String {
        self.mode = mode;
        self.hex_counter = 0;
        if mode == RenderMode::Hex {
            "\n".to_string()
        } else {
            String::new()
        }
    }

    /// Render one received byte. In protocol mode this is used for bytes
    /// the framer handed back as pass-through.
    pub fn render_byte(&mut self, byte: u8) -> String {
        match self.mode {
            RenderMode::Ascii => self.render_ascii(byte),
            RenderMode::Hex => self.render_hex(byte),
            RenderMode::Protocol => self.render_pass_through(byte),
        }
    }

    /// Newline code becomes a line break, every other byte its literal character
    pub fn render_ascii(&self, byte: u8) -> String {
        if byte == self.newline.byte() {
            "\n".to_string()
        } else {
            char::from(byte).to_string()
        }
    }

    /// `0xNN` followed by a byte, column or line separator
    pub fn render_hex(&mut self, byte: u8) -> String {
        let mut text = format!("0x{:02X}", byte);
        self.hex_counter += 1;

        if self.hex_counter == HEX_COLUMN {
            text.push_str(" - ");
        } else if self.hex_counter == HEX_LINE {
            text.push('\n');
            self.hex_counter = 0;
        } else {
            text.push('.');
        }
        text
    }

    /// Printable ASCII as-is, newline code as a line break, anything else as
    /// two lowercase hex digits
    pub fn render_pass_through(&self, byte: u8) -> String {
        if (0x20..0x80).contains(&byte) {
            char::from(byte).to_string()
        } else if byte == self.newline.byte() {
            "\n".to_string()
        } else {
            hex::encode([byte])
        }
    }

    /// Text for a framer event
    pub fn render_decode_event(&self, event: &DecodeEvent) -> String {
        match event {
            DecodeEvent::PassThrough(byte) => self.render_pass_through(*byte),
            DecodeEvent::Packet { text, .. } => text.clone(),
            DecodeEvent::ChecksumMismatch { .. } => CHECKSUM_ERROR_MARKER.to_string(),
        }
    }

    /// Local echo of a typed key, independent of the receive path
    pub fn render_echo(&self, key: u8) -> String {
        if self.mode == RenderMode::Ascii {
            char::from(key).to_string()
        } else {
            format!("0x{:02X}.", key)
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RenderMode::default(), NewlineCode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_newline_and_literals() {
        let mut r = Renderer::new(RenderMode::Ascii, NewlineCode::Lf);
        let text: String = b"ab\n\x01".iter().map(|&b| r.render_byte(b)).collect();
        assert_eq!(text, "ab\n\u{1}");

        // CR is literal when LF is the newline code
        assert_eq!(r.render_byte(0x0D), "\r");

        r.set_newline(NewlineCode::Cr);
        assert_eq!(r.render_byte(0x0D), "\n");
        // LF is now just a literal control character
        assert_eq!(r.render_byte(0x0A), "\u{a}");
    }

    #[test]
    fn test_ascii_high_bytes_are_literal() {
        let mut r = Renderer::new(RenderMode::Ascii, NewlineCode::Lf);
        assert_eq!(r.render_byte(0xE9), "\u{e9}");
    }

    #[test]
    fn test_hex_seventeen_bytes() {
        let mut r = Renderer::new(RenderMode::Hex, NewlineCode::Lf);
        let text: String = (0..17u8).map(|b| r.render_byte(b)).collect();

        assert_eq!(text.matches('\n').count(), 1);
        assert_eq!(text.matches(" - ").count(), 1);
        assert!(text.starts_with("0x00.0x01."));
        assert!(text.contains("0x07 - 0x08."));
        assert!(text.ends_with("0x0F\n0x10."));
        assert_eq!(r.hex_counter, 1);
    }

    #[test]
    fn test_hex_counter_resets_on_select() {
        let mut r = Renderer::new(RenderMode::Hex, NewlineCode::Lf);
        for b in 0..5u8 {
            r.render_byte(b);
        }
        assert_eq!(r.set_mode(RenderMode::Hex), "\n");
        assert_eq!(r.hex_counter, 0);

        let text: String = (0..8u8).map(|b| r.render_byte(b)).collect();
        assert!(text.ends_with("0x07 - "));
    }

    #[test]
    fn test_set_mode_text() {
        let mut r = Renderer::default();
        assert_eq!(r.set_mode(RenderMode::Protocol), "");
        assert_eq!(r.mode(), RenderMode::Protocol);
        assert_eq!(r.set_mode(RenderMode::Ascii), "");
    }

    #[test]
    fn test_pass_through() {
        let r = Renderer::new(RenderMode::Protocol, NewlineCode::Lf);
        assert_eq!(r.render_pass_through(b'A'), "A");
        assert_eq!(r.render_pass_through(b' '), " ");
        assert_eq!(r.render_pass_through(0x7F), "\u{7f}");
        assert_eq!(r.render_pass_through(0x0A), "\n");
        assert_eq!(r.render_pass_through(0x0D), "0d");
        assert_eq!(r.render_pass_through(0xAB), "ab");
        assert_eq!(r.render_pass_through(0x80), "80");
    }

    #[test]
    fn test_render_decode_event() {
        let r = Renderer::new(RenderMode::Protocol, NewlineCode::Lf);
        let packet = DecodeEvent::Packet {
            body: vec![1],
            text: "temp=21\n".to_string(),
        };
        let bad = DecodeEvent::ChecksumMismatch {
            body: vec![1],
            expected: 1,
            received: 2,
        };
        assert_eq!(r.render_decode_event(&packet), "temp=21\n");
        assert_eq!(r.render_decode_event(&bad), CHECKSUM_ERROR_MARKER);
        assert_eq!(r.render_decode_event(&DecodeEvent::PassThrough(b'q')), "q");
    }

    #[test]
    fn test_echo() {
        let mut r = Renderer::new(RenderMode::Ascii, NewlineCode::Lf);
        assert_eq!(r.render_echo(b'k'), "k");
        r.set_mode(RenderMode::Hex);
        assert_eq!(r.render_echo(b'k'), "0x6B.");
        r.set_mode(RenderMode::Protocol);
        assert_eq!(r.render_echo(0x0D), "0x0D.");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("HEX".parse::<RenderMode>().unwrap(), RenderMode::Hex);
        assert!(matches!("binary".parse::<RenderMode>(), Err(Error::InvalidMode(_))));
        assert_eq!(RenderMode::Protocol.next(), RenderMode::Ascii);
        assert_eq!(RenderMode::Ascii.to_string(), "ASCII");
    }

    #[test]
    fn test_newline_codes() {
        assert_eq!(NewlineCode::try_from(0x0D).unwrap(), NewlineCode::Cr);
        assert!(matches!(NewlineCode::try_from(0x00), Err(Error::InvalidNewline(0x00))));
        assert_eq!("0x0a".parse::<NewlineCode>().unwrap().byte(), 0x0A);
        assert!("crlf".parse::<NewlineCode>().is_err());
        assert_eq!(NewlineCode::Lf.toggled(), NewlineCode::Cr);
        assert_eq!(NewlineCode::Cr.toggled(), NewlineCode::Lf);
    }
}
