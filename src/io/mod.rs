// src/io/mod.rs
//
// Device IO for the terminal: the serial driver and the types shared between
// the reader thread and its consumer.

pub mod serial;
mod types;

pub use types::{ByteStream, ReaderEvent, TransmitRequest, TransmitSender};
