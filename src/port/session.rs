// src/port/session.rs
//! Reader side of a session: owns the transport and feeds the line buffer

use super::{buffer::BufferError, Connector, Transport};
use crate::{config::GpsConfig, context::SessionContext};
use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Longest single sleep while waiting to retry an open
const PAUSE_STEP: Duration = Duration::from_millis(100);

/// Why a poll produced no bytes
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no data before the read timeout")]
    Timeout,
    #[error("line buffer is full")]
    BufferFull,
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl From<BufferError> for ReadError {
    fn from(_: BufferError) -> Self {
        ReadError::BufferFull
    }
}

pub struct TransportSession {
    device: String,
    connector: Arc<dyn Connector>,
    ctx: Arc<SessionContext>,
    transport: Option<Box<dyn Transport>>,
    read_timeout: Duration,
    reopen_interval: Duration,
    max_reopen_attempts: u32,
    scratch: Vec<u8>,
}

impl TransportSession {
    pub fn new(
        device: impl Into<String>,
        connector: Arc<dyn Connector>,
        ctx: Arc<SessionContext>,
        config: &GpsConfig,
    ) -> Self {
        Self {
            device: device.into(),
            connector,
            ctx,
            transport: None,
            read_timeout: config.read_timeout(),
            reopen_interval: config.reopen_interval(),
            max_reopen_attempts: config.max_reopen_attempts,
            scratch: vec![0; config.max_line_len],
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Open the device, retrying until it succeeds or the session stops.
    ///
    /// Returns false only when the session stopped first.
    pub fn open(&mut self) -> bool {
        let mut attempts = 0u32;
        while self.ctx.is_running() {
            attempts += 1;
            match self.connect() {
                Ok(()) => {
                    info!("Opened {} after {} attempt(s)", self.device, attempts);
                    return true;
                }
                Err(e) => {
                    if attempts == 1 {
                        warn!("Failed to open {}: {}", self.device, e);
                    } else {
                        debug!("Open attempt {} on {} failed: {}", attempts, self.device, e);
                    }
                    self.pause(self.reopen_interval);
                }
            }
        }
        false
    }

    fn connect(&mut self) -> io::Result<()> {
        let transport = self.connector.open(&self.device)?;
        self.ctx.port.install(transport.writer()?);
        self.transport = Some(transport);
        Ok(())
    }

    /// Sleep in short steps so a shutdown is noticed promptly
    fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.ctx.is_running() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(PAUSE_STEP));
        }
    }

    pub fn close(&mut self) {
        self.ctx.port.close();
        if self.transport.take().is_some() {
            debug!("Closed {}", self.device);
        }
    }

    /// Wait for readable data and move whatever arrived into the line buffer.
    ///
    /// End of stream counts as a transport failure.
    pub fn poll_and_read(&mut self) -> Result<usize, ReadError> {
        let free = self.ctx.buffer.free();
        if free == 0 {
            return Err(ReadError::BufferFull);
        }
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is closed"))?;

        let want = free.min(self.scratch.len());
        let n = match transport.read_timeout(&mut self.scratch[..want], self.read_timeout) {
            Ok(0) => {
                return Err(ReadError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "device closed the stream",
                )))
            }
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Err(ReadError::Timeout)
            }
            Err(e) => return Err(ReadError::Transport(e)),
        };

        self.ctx.buffer.append(&self.scratch[..n])?;
        Ok(n)
    }

    /// Reader thread body: open, read until stopped, reopen on failure.
    ///
    /// Gives up and shuts the whole session down after too many
    /// consecutive failed reopen attempts.
    pub fn run(mut self) {
        info!("Transport session started on {}", self.device);
        if !self.open() {
            self.close();
            return;
        }

        let mut failures = 0u32;
        while self.ctx.is_running() {
            match self.poll_and_read() {
                Ok(_) => failures = 0,
                Err(ReadError::Timeout) => {}
                Err(ReadError::BufferFull) => {
                    self.ctx.buffer.wait_writable(self.read_timeout);
                }
                Err(ReadError::Transport(e)) => {
                    self.close();
                    if !self.ctx.is_running() {
                        break;
                    }
                    failures += 1;
                    if failures > self.max_reopen_attempts {
                        error!(
                            "Giving up on {} after {} reopen attempts: {}",
                            self.device, self.max_reopen_attempts, e
                        );
                        self.ctx.shutdown();
                        break;
                    }
                    warn!(
                        "Read from {} failed ({}), reopening ({}/{})",
                        self.device, e, failures, self.max_reopen_attempts
                    );
                    self.pause(self.reopen_interval);
                    if let Err(e) = self.connect() {
                        warn!("Reopen of {} failed: {}", self.device, e);
                    }
                }
            }
        }

        self.close();
        info!("Transport session on {} stopped", self.device);
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("device", &self.device)
            .field("open", &self.is_open())
            .field("read_timeout", &self.read_timeout)
            .field("max_reopen_attempts", &self.max_reopen_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::buffer::LineBuffer;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Script = Arc<Mutex<VecDeque<io::Result<Vec<u8>>>>>;

    struct ScriptedTransport(Script);

    impl Transport for ScriptedTransport {
        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            match self.0.lock().unwrap().pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn writer(&self) -> io::Result<Box<dyn Write + Send>> {
            Ok(Box::new(io::sink()))
        }
    }

    struct ScriptedConnector {
        script: Script,
        failures_before_open: AtomicUsize,
        opens: AtomicUsize,
    }

    impl ScriptedConnector {
        fn new(chunks: Vec<io::Result<Vec<u8>>>, failures_before_open: usize) -> Self {
            Self {
                script: Arc::new(Mutex::new(chunks.into())),
                failures_before_open: AtomicUsize::new(failures_before_open),
                opens: AtomicUsize::new(0),
            }
        }
    }

    impl Connector for ScriptedConnector {
        fn open(&self, _device: &str) -> io::Result<Box<dyn Transport>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.failures_before_open.load(Ordering::SeqCst) > 0 {
                self.failures_before_open.fetch_sub(1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
            }
            Ok(Box::new(ScriptedTransport(Arc::clone(&self.script))))
        }
    }

    fn fast_config() -> GpsConfig {
        GpsConfig {
            read_timeout_ms: 10,
            reopen_interval_ms: 1,
            max_reopen_attempts: 2,
            ..GpsConfig::default()
        }
    }

    fn running_context() -> Arc<SessionContext> {
        let ctx = Arc::new(SessionContext::new(
            LineBuffer::default(),
            Duration::from_secs(1),
        ));
        ctx.begin();
        ctx
    }

    #[test]
    fn test_poll_and_read_moves_bytes_into_buffer() {
        let ctx = running_context();
        let connector = Arc::new(ScriptedConnector::new(
            vec![
                Ok(b"$GPGGA,1".to_vec()),
                Err(io::Error::new(io::ErrorKind::TimedOut, "quiet")),
                Ok(b"\r\n".to_vec()),
            ],
            0,
        ));
        let mut session = TransportSession::new("/dev/test", connector, Arc::clone(&ctx), &fast_config());
        assert!(session.open());
        assert!(ctx.port.is_open());

        assert_eq!(session.poll_and_read().unwrap(), 8);
        assert!(matches!(session.poll_and_read(), Err(ReadError::Timeout)));
        assert_eq!(session.poll_and_read().unwrap(), 2);
        assert_eq!(ctx.buffer.take_line(), Some(b"$GPGGA,1".to_vec()));

        // Script exhausted reads as end of stream
        assert!(matches!(session.poll_and_read(), Err(ReadError::Transport(_))));
    }

    #[test]
    fn test_poll_reports_full_buffer() {
        let ctx = Arc::new(SessionContext::new(LineBuffer::new(4, 4), Duration::from_secs(1)));
        ctx.begin();
        ctx.buffer.append(b"abcd").unwrap();
        let connector = Arc::new(ScriptedConnector::new(vec![Ok(b"x".to_vec())], 0));
        let mut session = TransportSession::new("/dev/test", connector, ctx, &fast_config());
        assert!(session.open());
        assert!(matches!(session.poll_and_read(), Err(ReadError::BufferFull)));
    }

    #[test]
    fn test_open_retries_until_device_appears() {
        let ctx = running_context();
        let connector = Arc::new(ScriptedConnector::new(Vec::new(), 3));
        let mut session =
            TransportSession::new("/dev/test", connector.clone(), ctx, &fast_config());
        assert!(session.open());
        assert_eq!(connector.opens.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_open_gives_up_when_stopped() {
        let ctx = running_context();
        ctx.shutdown();
        let connector = Arc::new(ScriptedConnector::new(Vec::new(), 0));
        let mut session = TransportSession::new("/dev/test", connector.clone(), ctx, &fast_config());
        assert!(!session.open());
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_shuts_down_after_repeated_failures() {
        let ctx = running_context();
        // Every read hits end of stream
        let connector = Arc::new(ScriptedConnector::new(Vec::new(), 0));
        let session = TransportSession::new("/dev/test", connector.clone(), Arc::clone(&ctx), &fast_config());
        session.run();

        assert!(!ctx.is_running());
        assert!(!ctx.port.is_open());
        // Initial open plus two reopens
        assert_eq!(connector.opens.load(Ordering::SeqCst), 3);
    }
}
