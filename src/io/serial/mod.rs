// src/io/serial/mod.rs
//
// Serial port driver with packet framing support.
//
// Features:
// - Background byte reader (one event per received byte)
// - Port session lifecycle (open / reopen / close)
// - 0xFF 0x55 length-prefixed packet framing with pluggable checksum/decoding

pub mod framer;
pub mod reader;
pub mod session;
pub mod utils;

#[cfg(test)]
pub(crate) mod mock;

pub use framer::{DecodeEvent, DecoderState, FnCodec, FrameDecoder, NullCodec, PacketCodec};
pub use reader::{ByteReader, SerialDevice};
pub use session::{DeviceOpener, PortConfig, PortSession, SystemOpener, DEFAULT_READ_TIMEOUT};
pub use utils::{list_serial_ports, next_baud_rate, Parity, SerialPortInfo, BAUD_RATES};
