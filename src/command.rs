// src/command.rs
//! AT control commands and the acknowledgement handshake

use crate::error::{GpsError, Result};
use std::{
    fmt, io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Condvar, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Line the receiver sends once a command has been carried out
pub const ACK_TOKEN: &[u8] = b"OK";

/// Default time to wait for [`ACK_TOKEN`]
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Init,
    SetMode,
    FixRateContinuous,
    FixRateSingle,
    NmeaOn,
    NmeaOff,
    RunStart,
    RunStop,
}

/// Sent in order by `start`
pub const START_SEQUENCE: [Command; 5] = [
    Command::Init,
    Command::SetMode,
    Command::FixRateContinuous,
    Command::NmeaOn,
    Command::RunStart,
];

/// Sent in order by `stop`
pub const STOP_SEQUENCE: [Command; 3] = [
    Command::RunStop,
    Command::NmeaOff,
    Command::FixRateSingle,
];

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Init => "AT+ZGINIT",
            Command::SetMode => "AT+ZGMODE=3",
            Command::FixRateContinuous => "AT+ZGFIXRATE=65535,0",
            Command::FixRateSingle => "AT+ZGFIXRATE=1,0",
            Command::NmeaOn => "AT+ZGNMEA=31",
            Command::NmeaOff => "AT+ZGNMEA=0",
            Command::RunStart => "AT+ZGRUN=2",
            Command::RunStop => "AT+ZGRUN=0",
        }
    }

    /// Bytes on the wire, carriage return included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.as_str().as_bytes().to_vec();
        bytes.push(b'\r');
        bytes
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    /// Distinguishes this issue from any later one of the same command
    id: u64,
    command: Command,
    completed: bool,
}

/// At most one command in flight, completed by the dispatcher
/// when it sees [`ACK_TOKEN`].
#[derive(Debug)]
pub struct CommandHandshake {
    pending: Mutex<Option<PendingCommand>>,
    acked: Condvar,
    timeout: Duration,
    next_id: AtomicU64,
}

impl Default for CommandHandshake {
    fn default() -> Self {
        Self::new(DEFAULT_ACK_TIMEOUT)
    }
}

impl CommandHandshake {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            acked: Condvar::new(),
            timeout,
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `command` through `send` and block until it is acknowledged.
    ///
    /// Fails with [`GpsError::Busy`] without sending anything when
    /// another command is still waiting. A [`reset`](Self::reset) while
    /// waiting cancels this command even if another is issued right after.
    pub fn issue<F>(&self, command: Command, send: F) -> Result<()>
    where
        F: FnOnce(&[u8]) -> io::Result<()>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.lock();
            if let Some(current) = pending.as_ref() {
                warn!("Cannot send {}, {} is still pending", command, current.command);
                return Err(GpsError::Busy);
            }
            *pending = Some(PendingCommand {
                id,
                command,
                completed: false,
            });
        }

        debug!("Sending {}", command);
        if let Err(e) = send(&command.to_bytes()) {
            self.release(id);
            return Err(e.into());
        }

        let deadline = Instant::now() + self.timeout;
        let mut pending = self.lock();
        loop {
            match *pending {
                Some(p) if p.id == id && p.completed => {
                    pending.take();
                    debug!("{} acknowledged", command);
                    return Ok(());
                }
                Some(p) if p.id == id => {}
                // Reset while we were waiting; the slot may already hold a newer command
                _ => {
                    debug!("{} cancelled", command);
                    return Err(GpsError::AckTimeout(command.as_str()));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                pending.take();
                warn!("No acknowledgement for {} after {:?}", command, self.timeout);
                return Err(GpsError::AckTimeout(command.as_str()));
            }
            pending = self
                .acked
                .wait_timeout(pending, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Mark the pending command done; false when nothing was waiting
    pub fn acknowledge(&self) -> bool {
        let acked = match self.lock().as_mut() {
            Some(p) if !p.completed => {
                p.completed = true;
                true
            }
            _ => false,
        };
        if acked {
            self.acked.notify_all();
        }
        acked
    }

    /// Clear the slot only if it still belongs to issue `id`
    fn release(&self, id: u64) {
        let mut pending = self.lock();
        if pending.map_or(false, |p| p.id == id) {
            pending.take();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    pub fn pending(&self) -> Option<Command> {
        self.lock().map(|p| p.command)
    }

    /// Abandon any pending command and wake its sender
    pub fn reset(&self) {
        self.lock().take();
        self.acked.notify_all();
    }

    /// Issue each command in turn, stopping at the first failure
    pub fn run_sequence<F>(&self, commands: &[Command], mut send: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        for &command in commands {
            self.issue(command, &mut send)?;
        }
        Ok(())
    }
}
