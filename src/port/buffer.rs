// src/port/buffer.rs
//! Bounded line buffer shared by the port reader and the dispatcher

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Longest line accepted, terminator excluded
pub const MAX_LINE_LEN: usize = 128;

/// Room for eight maximum length lines
pub const BUFFER_CAPACITY: usize = MAX_LINE_LEN * 8;

const TERMINATOR: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("line buffer full: {needed} bytes needed, {free} free")]
    BufferFull { needed: usize, free: usize },
}

/// Outcome of one attempt to cut a line from the front of the frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Take {
    Line(Vec<u8>),
    /// No terminator yet, more bytes expected
    Incomplete,
    /// Bytes dropped as malformed
    Discarded(usize),
}

/// Append-only region that lines are cut from
#[derive(Debug)]
pub struct RawFrame {
    data: Vec<u8>,
    capacity: usize,
    max_line_len: usize,
    /// Set after a full frame was dropped; the next terminated
    /// fragment is the tail of that oversized line.
    resync: bool,
}

impl RawFrame {
    pub fn new(capacity: usize, max_line_len: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            max_line_len,
            resync: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() > self.free() {
            return Err(BufferError::BufferFull {
                needed: bytes.len(),
                free: self.free(),
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn take_line(&mut self) -> Take {
        let Some(end) = find_terminator(&self.data) else {
            if self.data.len() < self.capacity {
                return Take::Incomplete;
            }
            let dropped = self.data.len();
            debug!("Line buffer full without a terminator, dropping {} bytes", dropped);
            self.data.clear();
            self.resync = true;
            return Take::Discarded(dropped);
        };

        let consumed = end + TERMINATOR.len();
        if end > self.max_line_len {
            debug!("Line of {} bytes is too long, dropping it", end);
            self.data.drain(..consumed);
            self.resync = false;
            return Take::Discarded(consumed);
        }
        if self.resync {
            debug!("Dropping {} byte tail of an oversized line", end);
            self.data.drain(..consumed);
            self.resync = false;
            return Take::Discarded(consumed);
        }

        let line = self.data[..end].to_vec();
        self.data.drain(..consumed);
        Take::Line(line)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.resync = false;
    }
}

fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

/// [`RawFrame`] behind a mutex, with condition variables for both sides.
///
/// The lock is only held while bytes are copied in or a line is cut out.
#[derive(Debug)]
pub struct LineBuffer {
    frame: Mutex<RawFrame>,
    readable: Condvar,
    writable: Condvar,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(BUFFER_CAPACITY, MAX_LINE_LEN)
    }
}

impl LineBuffer {
    pub fn new(capacity: usize, max_line_len: usize) -> Self {
        Self {
            frame: Mutex::new(RawFrame::new(capacity, max_line_len)),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RawFrame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn free(&self) -> usize {
        self.lock().free()
    }

    pub fn append(&self, bytes: &[u8]) -> Result<(), BufferError> {
        self.lock().append(bytes)?;
        self.readable.notify_one();
        Ok(())
    }

    /// Cut the next complete line, if any
    pub fn take_line(&self) -> Option<Vec<u8>> {
        let take = self.lock().take_line();
        match take {
            Take::Line(line) => {
                self.writable.notify_one();
                Some(line)
            }
            Take::Discarded(_) => {
                self.writable.notify_one();
                None
            }
            Take::Incomplete => None,
        }
    }

    /// Wait up to `timeout` for a complete line
    pub fn wait_line(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut frame = self.lock();
        loop {
            match frame.take_line() {
                Take::Line(line) => {
                    drop(frame);
                    self.writable.notify_one();
                    return Some(line);
                }
                Take::Discarded(_) => {
                    self.writable.notify_one();
                    continue;
                }
                Take::Incomplete => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            frame = self
                .readable
                .wait_timeout(frame, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wait up to `timeout` for free space; returns the bytes available
    pub fn wait_writable(&self, timeout: Duration) -> usize {
        let frame = self.lock();
        let (frame, _) = self
            .writable
            .wait_timeout_while(frame, timeout, |frame| frame.free() == 0)
            .unwrap_or_else(PoisonError::into_inner);
        frame.free()
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.writable.notify_all();
    }

    /// Wake every waiter, used on shutdown
    pub fn wake(&self) {
        self.readable.notify_all();
        self.writable.notify_all();
    }
}
