// src/cli.rs
//
// Interactive terminal front end. Settings come from the TOML file and are
// overridden by command line flags. With `--sniff` a second port is opened
// and both are monitored receive-only. Everything is driven from this thread
// until the user quits or a device fails.

use std::io::{Stdout, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{cursor, terminal};

use crate::error::{Error, Result};
use crate::io::serial::{list_serial_ports, next_baud_rate, Parity, PortSession};
use crate::io::ByteStream;
use crate::render::{NewlineCode, RenderMode};
use crate::settings::TerminalSettings;
use crate::sniffer::{SniffChannel, Sniffer};
use crate::terminal::{DisplaySink, Terminal};

/// Keyboard poll interval; also bounds display latency
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Events handled per display refresh
const DRAIN_BATCH: usize = 4096;

/// uartscope: serial terminal and 0xFF 0x55 packet sniffer
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Serial port path/name
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate (9600, 19200, 38400, 57600, 115200, 230400)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Parity (none|odd|even)
    #[arg(long)]
    pub parity: Option<Parity>,

    /// Display mode (ascii|hex|protocol)
    #[arg(short, long)]
    pub mode: Option<RenderMode>,

    /// Newline code (lf|cr)
    #[arg(short, long)]
    pub newline: Option<NewlineCode>,

    /// Echo typed keys to the display
    #[arg(long)]
    pub local_echo: bool,

    /// Never write to the device
    #[arg(long)]
    pub rx_only: bool,

    /// File the raw capture is saved to (Ctrl-S)
    #[arg(short, long)]
    pub capture: Option<PathBuf>,

    /// Settings file (default: <config dir>/uartscope/settings.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Also monitor this port; both ports are receive-only
    #[arg(long, value_name = "PORT2")]
    pub sniff: Option<String>,

    /// List serial ports and exit
    #[arg(long)]
    pub list: bool,
}

impl Args {
    /// Overlay the flags that were given on top of file settings
    pub fn apply(&self, settings: &mut TerminalSettings) {
        if let Some(port) = &self.port {
            settings.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            settings.baud_rate = baud;
        }
        if let Some(parity) = self.parity {
            settings.parity = parity;
        }
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(newline) = self.newline {
            settings.newline = newline;
        }
        if self.local_echo {
            settings.local_echo = true;
        }
        if self.rx_only {
            settings.rx_only = true;
        }
        if let Some(capture) = &self.capture {
            settings.capture_path = capture.clone();
        }
        if let Some(dir) = &self.log_dir {
            settings.log_dir = Some(dir.clone());
        }
    }
}

// ============================================================================
// Key Handling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    SaveCapture,
    ResetData,
    ClearDisplay,
    CycleMode,
    ToggleEcho,
    ToggleNewline,
    ToggleRxOnly,
    NextBaudRate,
    Send(u8),
}

/// Translate a key press. Enter sends the current newline code.
pub fn map_key(key: &KeyEvent, newline: NewlineCode) -> Option<KeyAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => Some(KeyAction::Quit),
            KeyCode::Char('s') => Some(KeyAction::SaveCapture),
            KeyCode::Char('r') => Some(KeyAction::ResetData),
            KeyCode::Char('l') => Some(KeyAction::ClearDisplay),
            KeyCode::Char('t') => Some(KeyAction::CycleMode),
            KeyCode::Char('e') => Some(KeyAction::ToggleEcho),
            KeyCode::Char('n') => Some(KeyAction::ToggleNewline),
            KeyCode::Char('o') => Some(KeyAction::ToggleRxOnly),
            KeyCode::Char('b') => Some(KeyAction::NextBaudRate),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Enter => Some(KeyAction::Send(newline.byte())),
        KeyCode::Tab => Some(KeyAction::Send(0x09)),
        KeyCode::Backspace => Some(KeyAction::Send(0x08)),
        KeyCode::Esc => Some(KeyAction::Send(0x1B)),
        KeyCode::Char(c) if c.is_ascii() => Some(KeyAction::Send(c as u8)),
        _ => None,
    }
}

// ============================================================================
// Stdout Sink
// ============================================================================

/// Writes rendered text to stdout. Raw mode needs explicit carriage returns.
struct StdoutSink {
    out: Stdout,
}

impl StdoutSink {
    fn new() -> Self {
        StdoutSink { out: std::io::stdout() }
    }

    fn status(&mut self, message: &str) {
        self.append_text(&format!("\n[{}]\n", message));
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl DisplaySink for StdoutSink {
    fn append_text(&mut self, text: &str) {
        let _ = self.out.write_all(text.replace('\n', "\r\n").as_bytes());
    }

    fn clear(&mut self) {
        let _ = crossterm::execute!(
            self.out,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0)
        );
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse arguments and run the terminal. Returns the process exit code.
pub fn run() -> i32 {
    let args = Args::parse();
    match run_with_args(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run_with_args(args: Args) -> Result<()> {
    if args.list {
        return print_ports();
    }

    let mut settings = match args.config.clone().or_else(TerminalSettings::default_path) {
        Some(path) => TerminalSettings::load(&path)?,
        None => TerminalSettings::default(),
    };
    args.apply(&mut settings);
    settings.validate()?;

    if let Some(dir) = &settings.log_dir {
        crate::logging::init_file_logging(dir)?;
    }

    let result = match &args.sniff {
        Some(second) => run_sniffer(&settings, second),
        None => run_session(&settings),
    };
    crate::logging::stop_file_logging();
    result
}

fn print_ports() -> Result<()> {
    let ports = list_serial_ports().map_err(std::io::Error::from)?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for p in ports {
        match p.product {
            Some(product) => println!("{}\t{}\t{}", p.port_name, p.port_type, product),
            None => println!("{}\t{}", p.port_name, p.port_type),
        }
    }
    Ok(())
}

const KEY_HELP: &str = "Ctrl-Q quit, Ctrl-S save, Ctrl-R reset, Ctrl-L clear, Ctrl-T mode, \
Ctrl-N newline, Ctrl-E echo, Ctrl-O rx-only, Ctrl-B baud";

/// Next key press, if one arrives within the poll interval
fn next_key() -> Result<Option<KeyEvent>> {
    if !event::poll(POLL_INTERVAL)? {
        return Ok(None);
    }
    match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
        _ => Ok(None),
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn run_session(settings: &TerminalSettings) -> Result<()> {
    let mut session = PortSession::new();
    let mut stream = session.open(settings.port_config()?)?;
    let mut term = Terminal::new(settings.terminal_config());

    terminal::enable_raw_mode()?;
    let mut sink = StdoutSink::new();
    sink.status(&format!(
        "{} | {} baud | {} | {}",
        settings.port.as_deref().unwrap_or_default(),
        settings.baud_rate,
        term.mode(),
        KEY_HELP
    ));

    let result = event_loop(&mut session, &mut stream, &mut term, &mut sink, &settings.capture_path);

    let _ = sink.flush();
    let _ = terminal::disable_raw_mode();
    session.close();
    println!();
    result
}

fn event_loop(
    session: &mut PortSession,
    stream: &mut ByteStream,
    term: &mut Terminal,
    sink: &mut StdoutSink,
    capture_path: &Path,
) -> Result<()> {
    loop {
        match term.drain(stream, sink, DRAIN_BATCH) {
            Ok(_) => {}
            Err(e @ Error::ReadFailure { .. }) => {
                sink.status(&e.to_string());
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        sink.flush()?;

        let Some(key) = next_key()? else {
            continue;
        };

        match map_key(&key, term.config().newline) {
            Some(KeyAction::Quit) => return Ok(()),
            Some(KeyAction::SaveCapture) => match term.save_capture(capture_path) {
                Ok(()) => sink.status(&format!(
                    "Saved {} bytes to {}",
                    term.capture().len(),
                    capture_path.display()
                )),
                Err(e) => sink.status(&e.to_string()),
            },
            Some(KeyAction::ResetData) => term.reset_data(sink),
            Some(KeyAction::ClearDisplay) => term.clear(sink),
            Some(KeyAction::CycleMode) => {
                let mode = term.mode().next();
                sink.status(&format!("Mode: {}", mode));
                term.set_mode(mode, sink);
            }
            Some(KeyAction::ToggleEcho) => {
                let enabled = !term.config().local_echo;
                term.set_local_echo(enabled);
                sink.status(&format!("Local echo: {}", on_off(enabled)));
            }
            Some(KeyAction::ToggleNewline) => {
                let newline = term.config().newline.toggled();
                term.set_newline(newline.byte())?;
                sink.status(&format!("Newline: {:?}", newline));
            }
            Some(KeyAction::ToggleRxOnly) => {
                let enabled = !term.config().rx_only;
                term.set_rx_only(enabled);
                sink.status(&format!("Receive only: {}", on_off(enabled)));
            }
            Some(KeyAction::NextBaudRate) => {
                let current = session.config().map(|c| c.baud_rate).unwrap_or_default();
                let baud = next_baud_rate(current);
                match session.set_baud_rate(baud) {
                    Ok(new_stream) => {
                        *stream = new_stream;
                        sink.status(&format!("Baud rate: {}", baud));
                    }
                    Err(e) => {
                        sink.status(&e.to_string());
                        return Err(e);
                    }
                }
            }
            Some(KeyAction::Send(byte)) => {
                if let Some(b) = term.key_pressed(byte, sink) {
                    if let Err(e) = session.send(&[b]) {
                        tlog!("[cli] Transmit failed: {}", e);
                    }
                }
            }
            None => {}
        }
    }
}

fn run_sniffer(settings: &TerminalSettings, second_port: &str) -> Result<()> {
    let first = settings.port_config()?;
    let mut second = first.clone();
    second.port = second_port.to_string();

    let mut sniffer = Sniffer::new();
    for config in [first, second] {
        sniffer.add(SniffChannel::open(PortSession::new(), config, settings.terminal_config())?);
    }

    terminal::enable_raw_mode()?;
    let mut sink = StdoutSink::new();
    let labels: Vec<&str> = sniffer.channels().iter().map(|c| c.label()).collect();
    sink.status(&format!(
        "Sniffing {} | {} baud | {} | {}",
        labels.join(" + "),
        settings.baud_rate,
        sniffer.mode(),
        KEY_HELP
    ));

    let result = sniff_loop(&mut sniffer, &mut sink, settings);

    sniffer.flush(&mut sink);
    let _ = sink.flush();
    let _ = terminal::disable_raw_mode();
    sniffer.close();
    println!();
    result
}

fn sniff_loop(
    sniffer: &mut Sniffer,
    sink: &mut StdoutSink,
    settings: &TerminalSettings,
) -> Result<()> {
    let capture_path = settings.capture_path.as_path();
    let mut newline = settings.newline;
    let mut baud = settings.baud_rate;

    loop {
        match sniffer.drain_all(sink, DRAIN_BATCH) {
            Ok(_) => {}
            Err(e @ Error::ReadFailure { .. }) => {
                sink.status(&e.to_string());
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        sink.flush()?;

        let Some(key) = next_key()? else {
            continue;
        };

        match map_key(&key, newline) {
            Some(KeyAction::Quit) => return Ok(()),
            Some(KeyAction::SaveCapture) => match sniffer.save_captures(capture_path) {
                Ok(paths) => {
                    for (channel, path) in sniffer.channels().iter().zip(&paths) {
                        sink.status(&format!(
                            "Saved {} bytes from {} to {}",
                            channel.terminal().capture().len(),
                            channel.label(),
                            path.display()
                        ));
                    }
                }
                Err(e) => sink.status(&e.to_string()),
            },
            Some(KeyAction::ResetData) => {
                sniffer.reset_data();
                sink.clear();
            }
            Some(KeyAction::ClearDisplay) => sink.clear(),
            Some(KeyAction::CycleMode) => {
                let mode = sniffer.mode().next();
                sniffer.set_mode(mode, sink);
                sink.status(&format!("Mode: {}", mode));
            }
            Some(KeyAction::ToggleNewline) => {
                newline = newline.toggled();
                sniffer.set_newline(newline)?;
                sink.status(&format!("Newline: {:?}", newline));
            }
            Some(KeyAction::NextBaudRate) => {
                baud = next_baud_rate(baud);
                if let Err(e) = sniffer.set_baud_rate(baud) {
                    sink.status(&e.to_string());
                    return Err(e);
                }
                sink.status(&format!("Baud rate: {}", baud));
            }
            // Sniffed ports are receive-only: nothing is sent or echoed
            Some(KeyAction::ToggleEcho) | Some(KeyAction::ToggleRxOnly) | Some(KeyAction::Send(_)) => {}
            None => {}
        }
    }
}
