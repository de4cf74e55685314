// src/port/mod.rs
//! Device transport: opening, reading and writing the receiver's port

pub mod buffer;
pub mod serial;
pub mod session;

use std::{
    io::{self, Write},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

pub use buffer::{LineBuffer, BUFFER_CAPACITY, MAX_LINE_LEN};
pub use serial::SerialConnector;
pub use session::TransportSession;

/// An open, bidirectional connection to the receiver
pub trait Transport: Send {
    /// Wait up to `timeout` for data, then perform a single read into `buf`.
    ///
    /// A timeout is reported as `io::ErrorKind::TimedOut`.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// A separate handle for writing commands while reads continue
    fn writer(&self) -> io::Result<Box<dyn Write + Send>>;
}

/// Opens transports by device path
pub trait Connector: Send + Sync {
    fn open(&self, device: &str) -> io::Result<Box<dyn Transport>>;
}

/// Write side of the current transport, swapped on every (re)open
#[derive(Default)]
pub struct CommandPort {
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    opened: Condvar,
}

impl CommandPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Write + Send>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn install(&self, writer: Box<dyn Write + Send>) {
        *self.lock() = Some(writer);
        self.opened.notify_all();
    }

    pub fn close(&self) {
        self.lock().take();
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Wait up to `timeout` for a transport to be installed
    pub fn wait_open(&self, timeout: Duration) -> bool {
        let writer = self.lock();
        let (writer, _) = self
            .opened
            .wait_timeout_while(writer, timeout, |writer| writer.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        writer.is_some()
    }

    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.lock();
        let writer = writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is not open"))?;
        writer.write_all(bytes)?;
        writer.flush()
    }

    /// Wake anyone waiting for the port, used on shutdown
    pub fn wake(&self) {
        self.opened.notify_all();
    }
}

impl std::fmt::Debug for CommandPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPort")
            .field("open", &self.is_open())
            .finish()
    }
}
