// src/lib.rs
//
// uartscope: serial terminal and sniffer for 0xFF 0x55 framed packets.
//
// The device is read on a background thread that forwards each byte over a
// bounded queue. The consumer (`Terminal`) captures every byte and renders
// it as ASCII, hex, or decoded packets.

#[macro_use]
mod logging;

pub mod capture;
pub mod error;
pub mod io;
pub mod render;
pub mod settings;
pub mod sniffer;
pub mod terminal;

#[cfg(feature = "cli")]
pub mod cli;

pub use capture::RawCapture;
pub use error::{Error, Result};
pub use io::serial::{
    DecodeEvent, DecoderState, FnCodec, FrameDecoder, NullCodec, PacketCodec, PortConfig, PortSession,
};
pub use io::{ByteStream, ReaderEvent};
pub use render::{NewlineCode, RenderMode, Renderer};
pub use settings::TerminalSettings;
pub use sniffer::{SniffChannel, Sniffer};
pub use terminal::{DisplaySink, Terminal, TerminalConfig};

/// Start file logging into `log_dir`. Returns the path of the new log file.
pub fn start_file_logging(log_dir: &std::path::Path) -> Result<std::path::PathBuf> {
    logging::init_file_logging(log_dir)
}

/// Close the log file opened by `start_file_logging`
pub fn stop_file_logging() {
    logging::stop_file_logging()
}
