// src/io/serial/framer.rs
//
// Packet framing for the protocol terminal mode.
// Packets are embedded in a free-form byte stream as
//   0xFF 0x55 <size> <size bytes of body> <checksum>
// Bytes outside a packet are handed back as pass-through.

// =============================================================================
// Constants
// =============================================================================

pub const HEADER_FF: u8 = 0xFF;
pub const HEADER_55: u8 = 0x55;

/// Checksum returned by the default codec
pub const SENTINEL_CHECKSUM: u8 = 0x00;

// =============================================================================
// Codec
// =============================================================================

/// Checksum and payload decoding for packet bodies.
/// Supplied by the caller; the framer never assumes an algorithm.
pub trait PacketCodec {
    fn checksum(&self, body: &[u8]) -> u8;
    fn decode(&self, body: &[u8]) -> String;
}

/// Default codec: sentinel checksum, empty text
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCodec;

impl PacketCodec for NullCodec {
    fn checksum(&self, _body: &[u8]) -> u8 {
        SENTINEL_CHECKSUM
    }

    fn decode(&self, _body: &[u8]) -> String {
        String::new()
    }
}

/// Codec built from two closures
pub struct FnCodec<C, D> {
    checksum: C,
    decode: D,
}

impl<C, D> FnCodec<C, D>
where
    C: Fn(&[u8]) -> u8,
    D: Fn(&[u8]) -> String,
{
    pub fn new(checksum: C, decode: D) -> Self {
        FnCodec { checksum, decode }
    }
}

impl<C, D> PacketCodec for FnCodec<C, D>
where
    C: Fn(&[u8]) -> u8,
    D: Fn(&[u8]) -> String,
{
    fn checksum(&self, body: &[u8]) -> u8 {
        (self.checksum)(body)
    }

    fn decode(&self, body: &[u8]) -> String {
        (self.decode)(body)
    }
}

// =============================================================================
// Types
// =============================================================================

/// Framer state. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitHeader1,
    AwaitHeader2,
    AwaitSize,
    AwaitBody,
    AwaitChecksum,
}

/// Output of feeding one byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// Byte is not part of a packet and should be rendered directly
    PassThrough(u8),
    /// Checksum matched; `text` is the codec's rendering of `body`
    Packet { body: Vec<u8>, text: String },
    /// Checksum did not match
    ChecksumMismatch {
        body: Vec<u8>,
        expected: u8,
        received: u8,
    },
}

// =============================================================================
// Frame Decoder
// =============================================================================

/// Stateful packet decoder, fed one byte at a time.
pub struct FrameDecoder {
    codec: Box<dyn PacketCodec + Send>,
    state: DecoderState,
    expected_len: usize,
    body: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(Box::new(NullCodec))
    }
}

impl FrameDecoder {
    pub fn new(codec: Box<dyn PacketCodec + Send>) -> Self {
        FrameDecoder {
            codec,
            state: DecoderState::AwaitHeader1,
            expected_len: 0,
            body: Vec::new(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Body bytes collected so far for the packet in progress
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    /// Drop any partial packet and start scanning for a header again.
    /// A completed packet's body has already moved out with its event.
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitHeader1;
        self.expected_len = 0;
        self.body.clear();
    }

    /// Feed a single byte. Returns an event when the byte completes something
    /// the display should show.
    pub fn feed(&mut self, byte: u8) -> Option<DecodeEvent> {
        match self.state {
            DecoderState::AwaitHeader1 => {
                if byte == HEADER_FF {
                    self.state = DecoderState::AwaitHeader2;
                    None
                } else {
                    Some(DecodeEvent::PassThrough(byte))
                }
            }
            DecoderState::AwaitHeader2 => {
                match byte {
                    HEADER_55 => self.state = DecoderState::AwaitSize,
                    // Repeated 0xFF: the newest one is the header candidate
                    HEADER_FF => {}
                    // False alarm. The byte is dropped, not re-scanned.
                    _ => self.state = DecoderState::AwaitHeader1,
                }
                None
            }
            DecoderState::AwaitSize => {
                if byte > 0 {
                    self.expected_len = byte as usize;
                    self.body.clear();
                    self.body.reserve(self.expected_len);
                    self.state = DecoderState::AwaitBody;
                } else {
                    // Zero-length packets are malformed
                    self.state = DecoderState::AwaitHeader1;
                }
                None
            }
            DecoderState::AwaitBody => {
                if self.body.len() < self.expected_len {
                    self.body.push(byte);
                }
                if self.body.len() >= self.expected_len {
                    self.state = DecoderState::AwaitChecksum;
                }
                None
            }
            DecoderState::AwaitChecksum => {
                let body = std::mem::take(&mut self.body);
                let expected = self.codec.checksum(&body);
                self.reset();

                if expected == byte {
                    let text = self.codec.decode(&body);
                    Some(DecodeEvent::Packet { body, text })
                } else {
                    Some(DecodeEvent::ChecksumMismatch {
                        body,
                        expected,
                        received: byte,
                    })
                }
            }
        }
    }

    /// Feed a run of bytes, collecting every event in order.
    pub fn feed_all(&mut self, data: &[u8]) -> Vec<DecodeEvent> {
        data.iter().filter_map(|&b| self.feed(b)).collect()
    }
}
