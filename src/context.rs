// src/context.rs
//! State shared by the control surface and both worker threads

use crate::{
    callbacks::{GpsCallbacks, NoopCallbacks},
    command::CommandHandshake,
    gps::data::GpsStatus,
    port::{buffer::LineBuffer, CommandPort},
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
    time::Duration,
};
use tracing::info;

/// One per monitor, handed to the reader and dispatcher threads
pub struct SessionContext {
    running: AtomicBool,
    initialized: AtomicBool,
    status: Mutex<GpsStatus>,
    callbacks: RwLock<Option<Arc<dyn GpsCallbacks>>>,
    pub buffer: LineBuffer,
    pub port: CommandPort,
    pub handshake: CommandHandshake,
}

impl SessionContext {
    pub fn new(buffer: LineBuffer, ack_timeout: Duration) -> Self {
        Self {
            running: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            status: Mutex::new(GpsStatus::Off),
            callbacks: RwLock::new(None),
            buffer,
            port: CommandPort::new(),
            handshake: CommandHandshake::new(ack_timeout),
        }
    }

    /// The "should run" flag both worker loops check every iteration
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Fresh buffers and flags before the workers are spawned
    pub(crate) fn begin(&self) {
        self.buffer.clear();
        self.handshake.reset();
        self.running.store(true, Ordering::Release);
        self.initialized.store(true, Ordering::Release);
    }

    /// Stop both workers and report the engine off.
    ///
    /// Safe to call from any thread, more than once.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("GPS session shutting down");
        }
        self.initialized.store(false, Ordering::Release);
        self.handshake.reset();
        self.buffer.wake();
        self.port.wake();
        if self.status() != GpsStatus::Off {
            self.set_status(GpsStatus::Off);
        }
    }

    pub fn set_callbacks(&self, callbacks: Arc<dyn GpsCallbacks>) {
        *self.callbacks.write().unwrap_or_else(PoisonError::into_inner) = Some(callbacks);
    }

    pub fn has_callbacks(&self) -> bool {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current consumer; the lock is released before the caller uses it
    pub fn callbacks(&self) -> Arc<dyn GpsCallbacks> {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| Arc::new(NoopCallbacks))
    }

    pub fn status(&self) -> GpsStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record and report a status transition
    pub fn set_status(&self, status: GpsStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
        info!("GPS status: {}", status);
        self.callbacks().on_status_change(status);
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("running", &self.is_running())
            .field("initialized", &self.is_initialized())
            .field("status", &self.status())
            .field("buffered", &self.buffer.len())
            .field("port", &self.port)
            .finish()
    }
}
