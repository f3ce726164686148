// src/sniffer.rs
//
// Passive monitoring of several ports at once, typically the two directions
// of a UART link. Every port gets its own session, capture and framer, and
// all of them are receive-only. Output is merged line by line, each line
// tagged with the port it came from.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::io::serial::{PortConfig, PortSession};
use crate::io::ByteStream;
use crate::render::{NewlineCode, RenderMode};
use crate::terminal::{DisplaySink, Terminal, TerminalConfig};

/// A partial line this long is written out without waiting for a newline
const MAX_PENDING: usize = 256;

// ============================================================================
// Sniff Channel
// ============================================================================

/// One monitored port
pub struct SniffChannel {
    label: String,
    session: PortSession,
    stream: ByteStream,
    terminal: Terminal,
    pending: String,
}

impl SniffChannel {
    /// Open `config` on `session`. Receive-only is forced on.
    pub fn open(mut session: PortSession, config: PortConfig, terminal_config: TerminalConfig) -> Result<Self> {
        let label = config.port.clone();
        let stream = session.open(config)?;
        let terminal = Terminal::new(TerminalConfig {
            rx_only: true,
            ..terminal_config
        });

        Ok(SniffChannel {
            label,
            session,
            stream,
            terminal,
            pending: String::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    /// Handle up to `max` received bytes and write every completed line to `out`
    pub fn drain(&mut self, out: &mut dyn DisplaySink, max: usize) -> Result<usize> {
        let mut text = String::new();
        let result = self.terminal.drain(&self.stream, &mut text, max);
        self.pending.push_str(&text);
        self.emit_lines(out);
        result
    }

    /// Write out whatever partial line is buffered
    pub fn flush(&mut self, out: &mut dyn DisplaySink) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            out.append_text(&format!("[{}] {}\n", self.label, rest));
        }
    }

    pub fn set_mode(&mut self, mode: RenderMode, out: &mut dyn DisplaySink) {
        self.flush(out);
        let mut text = String::new();
        self.terminal.set_mode(mode, &mut text);
    }

    pub fn set_newline(&mut self, newline: NewlineCode) -> Result<()> {
        self.terminal.set_newline(newline.byte())
    }

    /// Reopen at another baud rate. Capture and framer state are kept.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.stream = self.session.set_baud_rate(baud_rate)?;
        Ok(())
    }

    /// Drop the capture and any buffered partial line
    pub fn reset_data(&mut self) {
        let mut text = String::new();
        self.terminal.reset_data(&mut text);
        self.pending.clear();
    }

    pub fn save_capture(&self, path: &Path) -> Result<()> {
        self.terminal.save_capture(path)
    }

    pub fn close(&mut self) {
        self.session.close();
    }

    fn emit_lines(&mut self, out: &mut dyn DisplaySink) {
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            out.append_text(&format!("[{}] {}", self.label, line));
        }
        if self.pending.len() >= MAX_PENDING {
            self.flush(out);
        }
    }
}

// ============================================================================
// Sniffer
// ============================================================================

#[derive(Default)]
pub struct Sniffer {
    channels: Vec<SniffChannel>,
}

impl Sniffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: SniffChannel) {
        tlog!("[sniffer] Monitoring {}", channel.label());
        self.channels.push(channel);
    }

    pub fn channels(&self) -> &[SniffChannel] {
        &self.channels
    }

    /// Current display mode (all channels share it)
    pub fn mode(&self) -> RenderMode {
        self.channels
            .first()
            .map(|c| c.terminal().mode())
            .unwrap_or_default()
    }

    /// Drain every channel once. Stops at the first failed port.
    pub fn drain_all(&mut self, out: &mut dyn DisplaySink, max: usize) -> Result<usize> {
        let mut handled = 0;
        for channel in &mut self.channels {
            handled += channel.drain(out, max)?;
        }
        Ok(handled)
    }

    pub fn flush(&mut self, out: &mut dyn DisplaySink) {
        for channel in &mut self.channels {
            channel.flush(out);
        }
    }

    pub fn set_mode(&mut self, mode: RenderMode, out: &mut dyn DisplaySink) {
        for channel in &mut self.channels {
            channel.set_mode(mode, out);
        }
    }

    pub fn set_newline(&mut self, newline: NewlineCode) -> Result<()> {
        for channel in &mut self.channels {
            channel.set_newline(newline)?;
        }
        Ok(())
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        for channel in &mut self.channels {
            channel.set_baud_rate(baud_rate)?;
        }
        Ok(())
    }

    pub fn reset_data(&mut self) {
        for channel in &mut self.channels {
            channel.reset_data();
        }
    }

    /// Save each channel's capture next to `base`, numbered from 1.
    /// Returns the paths written.
    pub fn save_captures(&self, base: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.channels.len());
        for (i, channel) in self.channels.iter().enumerate() {
            let path = capture_path_for(base, i + 1);
            channel.save_capture(&path)?;
            paths.push(path);
        }
        Ok(paths)
    }

    pub fn close(&mut self) {
        for channel in &mut self.channels {
            channel.close();
        }
    }
}

/// `dir/name.ext` -> `dir/name-<index>.ext`
pub fn capture_path_for(base: &Path, index: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    let name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}-{}", stem, index),
    };
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::mock::{MockLine, MockOpener};
    use std::time::{Duration, Instant};

    fn open_channel(port: &str, line: &MockLine, mode: RenderMode) -> SniffChannel {
        let session = PortSession::with_opener(Box::new(MockOpener::new(line.clone())));
        let config = PortConfig::new(port, 115200)
            .unwrap()
            .with_read_timeout(Duration::from_millis(5))
            .unwrap();
        let terminal_config = TerminalConfig {
            mode,
            local_echo: true,
            ..TerminalConfig::default()
        };
        SniffChannel::open(session, config, terminal_config).unwrap()
    }

    fn drain_until(sniffer: &mut Sniffer, out: &mut String, bytes: &[usize]) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            sniffer.drain_all(out, 64).unwrap();
            let done = sniffer
                .channels()
                .iter()
                .zip(bytes)
                .all(|(c, &n)| c.terminal().capture().len() >= n);
            if done || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_two_ports_feed_separate_terminals() {
        let tx_line = MockLine::new(Duration::from_millis(5));
        let rx_line = MockLine::new(Duration::from_millis(5));

        let mut sniffer = Sniffer::new();
        sniffer.add(open_channel("/dev/mockA", &tx_line, RenderMode::Ascii));
        sniffer.add(open_channel("/dev/mockB", &rx_line, RenderMode::Ascii));

        for channel in sniffer.channels() {
            assert!(channel.terminal().config().rx_only);
            assert!(channel.is_open());
        }

        tx_line.inject(b"AT\n");
        rx_line.inject(b"OK\n");

        let mut out = String::new();
        drain_until(&mut sniffer, &mut out, &[3, 3]);

        assert_eq!(sniffer.channels()[0].terminal().capture().as_bytes(), b"AT\n");
        assert_eq!(sniffer.channels()[1].terminal().capture().as_bytes(), b"OK\n");
        assert!(out.contains("[/dev/mockA] AT\n"));
        assert!(out.contains("[/dev/mockB] OK\n"));

        sniffer.close();
        assert!(sniffer.channels().iter().all(|c| !c.is_open()));
        assert!(tx_line.written().is_empty());
        assert!(rx_line.written().is_empty());
    }

    #[test]
    fn test_each_port_has_its_own_framer() {
        let a = MockLine::new(Duration::from_millis(5));
        let b = MockLine::new(Duration::from_millis(5));

        let mut sniffer = Sniffer::new();
        sniffer.add(open_channel("/dev/mockA", &a, RenderMode::Protocol));
        sniffer.add(open_channel("/dev/mockB", &b, RenderMode::Protocol));

        // A header on one port must not pair with a body on the other
        a.inject(&[0xFF, 0x55]);
        b.inject(&[0x01, 0x02]);

        let mut out = String::new();
        drain_until(&mut sniffer, &mut out, &[2, 2]);
        sniffer.flush(&mut out);

        assert_eq!(out, "[/dev/mockB] 0102\n");
    }

    #[test]
    fn test_partial_lines_wait_for_newline() {
        let line = MockLine::new(Duration::from_millis(5));
        let mut sniffer = Sniffer::new();
        sniffer.add(open_channel("/dev/mockA", &line, RenderMode::Ascii));

        line.inject(b"par");
        let mut out = String::new();
        drain_until(&mut sniffer, &mut out, &[3]);
        assert_eq!(out, "");

        line.inject(b"tial\nnext");
        drain_until(&mut sniffer, &mut out, &[12]);
        assert_eq!(out, "[/dev/mockA] partial\n");

        sniffer.flush(&mut out);
        assert_eq!(out, "[/dev/mockA] partial\n[/dev/mockA] next\n");
    }

    #[test]
    fn test_long_line_is_spilled() {
        let line = MockLine::new(Duration::from_millis(5));
        let mut sniffer = Sniffer::new();
        sniffer.add(open_channel("/dev/mockA", &line, RenderMode::Ascii));

        line.inject(&[b'x'; MAX_PENDING]);
        let mut out = String::new();
        drain_until(&mut sniffer, &mut out, &[MAX_PENDING]);

        assert_eq!(out.len(), "[/dev/mockA] \n".len() + MAX_PENDING);
    }

    #[test]
    fn test_reset_and_save() {
        let line = MockLine::new(Duration::from_millis(5));
        let mut sniffer = Sniffer::new();
        sniffer.add(open_channel("/dev/mockA", &line, RenderMode::Hex));

        line.inject(&[0x10, 0x20]);
        let mut out = String::new();
        drain_until(&mut sniffer, &mut out, &[2]);

        let base = std::env::temp_dir().join(format!("uartscope-sniff-{}.dat", std::process::id()));
        let paths = sniffer.save_captures(&base).unwrap();
        assert_eq!(paths, vec![capture_path_for(&base, 1)]);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), vec![0x10, 0x20]);
        std::fs::remove_file(&paths[0]).ok();

        sniffer.reset_data();
        assert_eq!(sniffer.channels()[0].terminal().capture().len(), 0);
        sniffer.flush(&mut out);
        assert_eq!(out, "");
    }

    #[test]
    fn test_mode_and_baud_apply_to_all_ports() {
        let a = MockLine::new(Duration::from_millis(5));
        let b = MockLine::new(Duration::from_millis(5));
        let mut sniffer = Sniffer::new();
        sniffer.add(open_channel("/dev/mockA", &a, RenderMode::Ascii));
        sniffer.add(open_channel("/dev/mockB", &b, RenderMode::Ascii));

        let mut out = String::new();
        sniffer.set_mode(RenderMode::Hex, &mut out);
        assert_eq!(sniffer.mode(), RenderMode::Hex);

        sniffer.set_newline(NewlineCode::Cr).unwrap();
        sniffer.set_baud_rate(9600).unwrap();
        for channel in sniffer.channels() {
            assert_eq!(channel.terminal().mode(), RenderMode::Hex);
            assert_eq!(channel.terminal().config().newline, NewlineCode::Cr);
            assert!(channel.is_open());
        }

        b.inject(&[0xAB]);
        drain_until(&mut sniffer, &mut out, &[0, 1]);
        sniffer.flush(&mut out);
        assert_eq!(out, "[/dev/mockB] 0xAB.\n");
    }

    #[test]
    fn test_capture_path_for() {
        assert_eq!(
            capture_path_for(Path::new("/tmp/uartscope.dat"), 2),
            PathBuf::from("/tmp/uartscope-2.dat")
        );
        assert_eq!(capture_path_for(Path::new("dump"), 1), PathBuf::from("dump-1"));
    }
}
