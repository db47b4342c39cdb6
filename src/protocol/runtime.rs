//! Serial transport plumbing: port parameters, opening, and line reassembly.

use serde::{Deserialize, Serialize};
use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{DataBits, StopBits};

/// Longest partial line kept while waiting for a terminator.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityMode {
    #[default]
    None,
    Odd,
    Even,
}

impl From<ParityMode> for serialport::Parity {
    fn from(p: ParityMode) -> Self {
        match p {
            ParityMode::None => serialport::Parity::None,
            ParityMode::Odd => serialport::Parity::Odd,
            ParityMode::Even => serialport::Parity::Even,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: ParityMode,
    /// Upper bound on a single blocking read.
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: ParityMode::None,
            read_timeout_ms: 100,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn apply_builder(&self, b: serialport::SerialPortBuilder) -> serialport::SerialPortBuilder {
        let b = b.data_bits(match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        });
        let b = b.stop_bits(match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        });
        b.parity(self.parity.into()).timeout(self.read_timeout())
    }
}

/// Read half of an open port. Reads must return within a bounded time;
/// `TimedOut`/`WouldBlock` are treated as "nothing yet".
pub type PortReader = Box<dyn Read + Send>;

/// Write half of an open port.
pub type PortWriter = Box<dyn Write + Send>;

/// An open port split into independently owned halves, so a blocking read
/// never holds up a command write.
pub struct SplitPort {
    pub reader: PortReader,
    pub writer: PortWriter,
}

impl std::fmt::Debug for SplitPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitPort").finish_non_exhaustive()
    }
}

/// Opens the transport for a device's serial port path.
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str, config: &SerialConfig) -> io::Result<SplitPort>;
}

/// Opens real serial devices through `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

fn clone_failed(port: &str, err: serialport::Error) -> io::Error {
    io::Error::other(format!("Failed to clone handle for {port}: {err}"))
}

impl PortOpener for SerialPortOpener {
    fn open(&self, port: &str, config: &SerialConfig) -> io::Result<SplitPort> {
        let builder = config.apply_builder(serialport::new(port, config.baud));

        #[cfg(unix)]
        {
            let mut handle = builder.open_native().map_err(|err| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Failed to open port {port}: {err}"),
                )
            })?;
            handle.set_exclusive(true).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("Failed to acquire exclusive access to {port}: {err}"),
                )
            })?;
            let reader = handle
                .try_clone_native()
                .map_err(|err| clone_failed(port, err))?;
            Ok(SplitPort {
                reader: Box::new(reader),
                writer: Box::new(handle),
            })
        }

        #[cfg(not(unix))]
        {
            let handle = builder.open().map_err(|err| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Failed to open port {port}: {err}"),
                )
            })?;
            let reader = handle.try_clone().map_err(|err| clone_failed(port, err))?;
            Ok(SplitPort {
                reader: Box::new(reader),
                writer: Box::new(handle),
            })
        }
    }
}

/// Whether a read error only means "no data within the timeout".
pub fn is_idle_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Reassembles `\n`-terminated lines from arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(512),
        }
    }

    /// Feed a chunk and return every line it completed, `\r\n` stripped.
    /// Empty lines are dropped; invalid UTF-8 is replaced lossily.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let text = text.trim_end_matches(['\n', '\r']);
            if !text.trim().is_empty() {
                lines.push(text.to_string());
            }
        }
        if self.buf.len() > MAX_LINE_BYTES {
            log::warn!(
                "Discarding {} bytes without a line terminator",
                self.buf.len()
            );
            self.buf.clear();
        }
        lines
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
