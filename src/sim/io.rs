//! IO handling for syscalls.
//!
//! The interface for IO is defined with the [`IODevice`] trait, which the
//! syscall services use to read from "stdin" and write to "stdout".
//! This is exposed to the simulator with the [`SimIO`] enum.
//!
//! Besides those two key items, this module also includes:
//! - [`EmptyIO`]: an `IODevice` where input is always at end-of-file and
//!   output is discarded,
//! - [`StdIO`]: an `IODevice` bound to the process's stdin/stdout,
//! - [`BufferedIO`]: an `IODevice` over shared in-memory buffers, which
//!   tests use to script input and capture output.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// An IO device the syscall services can read from and write to.
pub trait IODevice {
    /// Reads one line of input, without its trailing newline.
    ///
    /// At end-of-input this returns an empty string.
    fn read_line(&mut self) -> io::Result<String>;

    /// Reads a single byte of input, or `None` at end-of-input.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Writes bytes to the output.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// No IO: input is always at end-of-file, output is discarded.
pub struct EmptyIO;
impl IODevice for EmptyIO {
    fn read_line(&mut self) -> io::Result<String> {
        Ok(String::new())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(None)
    }

    fn write_bytes(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// IO bound to the process's stdin and stdout.
///
/// Output is flushed after every write so that prompts and program
/// output interleave correctly at an interactive terminal.
pub struct StdIO;
impl IODevice for StdIO {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut stdin = io::stdin().lock();
        let buf = stdin.fill_buf()?;
        match buf.first().copied() {
            Some(byte) => {
                stdin.consume(1);
                Ok(Some(byte))
            }
            None => Ok(None),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()
    }
}

/// IO that reads from an input buffer and writes to an output buffer.
///
/// The buffers are shared: clones of a `BufferedIO` (and the handles from
/// [`BufferedIO::input`] and [`BufferedIO::output`]) refer to the
/// same underlying storage, so a test can hold onto the buffers while the
/// simulator owns the device.
///
/// ```
/// use mipsim::sim::io::{BufferedIO, IODevice};
///
/// let mut io = BufferedIO::new();
/// io.input().write().unwrap().extend(b"42\n".iter());
///
/// assert_eq!(io.read_line().unwrap(), "42");
/// io.write_bytes(b"hello").unwrap();
/// assert_eq!(&*io.output().read().unwrap(), b"hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct BufferedIO {
    input: Arc<RwLock<VecDeque<u8>>>,
    output: Arc<RwLock<Vec<u8>>>,
}
impl BufferedIO {
    /// Creates a new `BufferedIO` with empty buffers.
    pub fn new() -> Self {
        BufferedIO::default()
    }

    /// Creates a new `BufferedIO` whose input buffer holds `input`.
    pub fn with_input(input: &str) -> Self {
        let io = BufferedIO::new();
        io.input.write().unwrap_or_else(PoisonError::into_inner).extend(input.bytes());
        io
    }

    /// Gets a handle to the input buffer.
    pub fn input(&self) -> &Arc<RwLock<VecDeque<u8>>> {
        &self.input
    }
    /// Gets a handle to the output buffer.
    pub fn output(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.output
    }

    /// The output buffer's contents, decoded lossily as UTF-8.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output.read().unwrap_or_else(PoisonError::into_inner)).into_owned()
    }

    fn input_mut(&self) -> RwLockWriteGuard<'_, VecDeque<u8>> {
        self.input.write().unwrap_or_else(PoisonError::into_inner)
    }
}
impl IODevice for BufferedIO {
    fn read_line(&mut self) -> io::Result<String> {
        let mut input = self.input_mut();
        let mut line = Vec::new();
        while let Some(byte) = input.pop_front() {
            if byte == b'\n' {
                break;
            }
            line.push(byte);
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input_mut().pop_front())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.write().unwrap_or_else(PoisonError::into_inner).extend_from_slice(bytes);
        Ok(())
    }
}

/// The IO device wrapper held by the simulator.
#[derive(Default)]
pub enum SimIO {
    /// No IO.
    #[default]
    Empty,
    /// Process stdin/stdout.
    Std,
    /// In-memory buffers.
    Buffered(BufferedIO),
}
impl IODevice for SimIO {
    fn read_line(&mut self) -> io::Result<String> {
        match self {
            SimIO::Empty       => EmptyIO.read_line(),
            SimIO::Std         => StdIO.read_line(),
            SimIO::Buffered(b) => b.read_line(),
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match self {
            SimIO::Empty       => EmptyIO.read_byte(),
            SimIO::Std         => StdIO.read_byte(),
            SimIO::Buffered(b) => b.read_byte(),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            SimIO::Empty       => EmptyIO.write_bytes(bytes),
            SimIO::Std         => StdIO.write_bytes(bytes),
            SimIO::Buffered(b) => b.write_bytes(bytes),
        }
    }
}
impl From<EmptyIO> for SimIO {
    fn from(_: EmptyIO) -> Self {
        SimIO::Empty
    }
}
impl From<StdIO> for SimIO {
    fn from(_: StdIO) -> Self {
        SimIO::Std
    }
}
impl From<BufferedIO> for SimIO {
    fn from(value: BufferedIO) -> Self {
        SimIO::Buffered(value)
    }
}
impl std::fmt::Debug for SimIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimIO::Empty       => f.write_str("Empty"),
            SimIO::Std         => f.write_str("Std"),
            SimIO::Buffered(_) => f.write_str("Buffered"),
        }
    }
}
