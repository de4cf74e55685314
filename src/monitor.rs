// src/monitor.rs
//! Session control surface: worker lifecycle and the start/stop command sequences

use crate::{
    callbacks::GpsCallbacks,
    command::{START_SEQUENCE, STOP_SEQUENCE},
    config::GpsConfig,
    context::SessionContext,
    dispatcher::Dispatcher,
    error::{GpsError, Result},
    gps::{data::GpsStatus, NmeaProcessor},
    port::{buffer::LineBuffer, Connector, SerialConnector, TransportSession},
};
use std::{
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};
use tracing::{info, warn};

/// Drives one receiver: a reader thread, a dispatcher thread and the
/// command handshake between them.
pub struct GpsMonitor {
    config: GpsConfig,
    connector: Arc<dyn Connector>,
    ctx: Arc<SessionContext>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl GpsMonitor {
    pub fn new(config: GpsConfig, connector: Arc<dyn Connector>) -> Self {
        let buffer = LineBuffer::new(config.buffer_capacity, config.max_line_len);
        let ctx = Arc::new(SessionContext::new(buffer, config.ack_timeout()));
        Self {
            config,
            connector,
            ctx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Monitor talking to a real serial port at the configured baud rate
    pub fn with_serial(config: GpsConfig) -> Self {
        let connector = Arc::new(SerialConnector::new(config.baud_rate));
        Self::new(config, connector)
    }

    pub fn config(&self) -> &GpsConfig {
        &self.config
    }

    pub fn set_callbacks(&self, callbacks: Arc<dyn GpsCallbacks>) {
        self.ctx.set_callbacks(callbacks);
    }

    /// Register `callbacks` and spawn the workers.
    ///
    /// Calling it again on a running session only swaps the callbacks;
    /// `EngineOn` is reported either way.
    pub fn init(&self, callbacks: Arc<dyn GpsCallbacks>) -> Result<()> {
        self.set_callbacks(callbacks);
        self.init_internal()
    }

    fn init_internal(&self) -> Result<()> {
        if self.ctx.is_initialized() {
            self.ctx.set_status(GpsStatus::EngineOn);
            return Ok(());
        }
        self.config.validate()?;
        let device = self.config.resolve_port()?;

        // Workers from an earlier session have already been told to stop
        self.join_workers();
        self.ctx.begin();

        let session = TransportSession::new(
            device.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.ctx),
            &self.config,
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.ctx),
            NmeaProcessor::new(self.config.fix_stale_after()),
        );

        let spawned = thread::Builder::new()
            .name("gps-reader".into())
            .spawn(move || session.run())
            .and_then(|reader| {
                self.lock_workers().push(reader);
                thread::Builder::new()
                    .name("gps-dispatch".into())
                    .spawn(move || dispatcher.run())
            });
        match spawned {
            Ok(handle) => self.lock_workers().push(handle),
            Err(e) => {
                self.cleanup();
                return Err(e.into());
            }
        }

        info!("GPS session initialized on {}", device);
        self.ctx.set_status(GpsStatus::EngineOn);
        Ok(())
    }

    /// Configure the receiver and begin streaming.
    ///
    /// Re-initializes first when the engine is off.
    pub fn start(&self) -> Result<()> {
        if self.ctx.status() == GpsStatus::Off {
            if !self.ctx.has_callbacks() {
                return Err(GpsError::NoCallbacks);
            }
            self.init_internal()?;
        }
        if !self.ctx.is_initialized() {
            return Err(GpsError::NotInitialized);
        }

        if !self.ctx.port.wait_open(self.config.open_wait()) {
            warn!("Port did not open within {:?}", self.config.open_wait());
            return Err(GpsError::TransportUnavailable(
                "port is not open".to_string(),
            ));
        }

        let ctx = &self.ctx;
        ctx.handshake
            .run_sequence(&START_SEQUENCE, |bytes| ctx.port.write_all(bytes))?;
        ctx.set_status(GpsStatus::SessionBegin);
        Ok(())
    }

    /// Stop streaming and return the receiver to single-fix mode
    pub fn stop(&self) -> Result<()> {
        if !self.ctx.is_initialized() {
            return Err(GpsError::NotInitialized);
        }

        let ctx = &self.ctx;
        ctx.handshake
            .run_sequence(&STOP_SEQUENCE, |bytes| ctx.port.write_all(bytes))?;
        ctx.set_status(GpsStatus::SessionEnd);
        Ok(())
    }

    /// Stop both workers and wait for them to exit
    pub fn cleanup(&self) {
        self.ctx.shutdown();
        self.join_workers();
    }

    pub fn status(&self) -> GpsStatus {
        self.ctx.status()
    }

    /// False once the session has shut down, on request or after
    /// exhausting its reopen attempts
    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_workers(&self) {
        let workers: Vec<_> = self.lock_workers().drain(..).collect();
        for handle in workers {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                warn!("{} thread panicked", name);
            }
        }
    }
}

impl Drop for GpsMonitor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for GpsMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpsMonitor")
            .field("config", &self.config)
            .field("ctx", &self.ctx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::{GpsLocation, SvStatus};
    use std::io;

    struct NeverOpens;

    impl Connector for NeverOpens {
        fn open(&self, _device: &str) -> io::Result<Box<dyn crate::port::Transport>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "absent"))
        }
    }

    struct Quiet;

    impl GpsCallbacks for Quiet {
        fn on_fix(&self, _fix: &GpsLocation) {}

        fn on_satellite_status(&self, _status: &SvStatus) {}
    }

    #[derive(Default)]
    struct Statuses(Mutex<Vec<GpsStatus>>);

    impl GpsCallbacks for Statuses {
        fn on_fix(&self, _fix: &GpsLocation) {}

        fn on_satellite_status(&self, _status: &SvStatus) {}

        fn on_status_change(&self, status: GpsStatus) {
            self.0.lock().unwrap().push(status);
        }
    }

    fn config() -> GpsConfig {
        GpsConfig {
            serial_port: Some("/dev/null-gps".to_string()),
            reopen_interval_ms: 5,
            open_wait_ms: 20,
            ..GpsConfig::default()
        }
    }

    #[test]
    fn test_stop_requires_init() {
        let monitor = GpsMonitor::new(config(), Arc::new(NeverOpens));
        assert!(matches!(monitor.stop(), Err(GpsError::NotInitialized)));
    }

    #[test]
    fn test_start_requires_callbacks() {
        let monitor = GpsMonitor::new(config(), Arc::new(NeverOpens));
        assert!(matches!(monitor.start(), Err(GpsError::NoCallbacks)));
        assert_eq!(monitor.status(), GpsStatus::Off);
    }

    #[test]
    fn test_start_without_port_is_transport_unavailable() {
        let monitor = GpsMonitor::new(config(), Arc::new(NeverOpens));
        monitor.init(Arc::new(Quiet)).unwrap();
        assert_eq!(monitor.status(), GpsStatus::EngineOn);

        assert!(matches!(
            monitor.start(),
            Err(GpsError::TransportUnavailable(_))
        ));
        monitor.cleanup();
        assert_eq!(monitor.status(), GpsStatus::Off);
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_repeated_init_reports_engine_on() {
        let monitor = GpsMonitor::new(config(), Arc::new(NeverOpens));
        let first = Arc::new(Statuses::default());
        let second = Arc::new(Statuses::default());

        monitor.init(first.clone()).unwrap();
        monitor.init(second.clone()).unwrap();
        assert_eq!(*first.0.lock().unwrap(), vec![GpsStatus::EngineOn]);
        assert_eq!(*second.0.lock().unwrap(), vec![GpsStatus::EngineOn]);
        assert_eq!(monitor.status(), GpsStatus::EngineOn);

        monitor.cleanup();
        assert_eq!(
            *second.0.lock().unwrap(),
            vec![GpsStatus::EngineOn, GpsStatus::Off]
        );
    }

    #[test]
    fn test_unresolvable_port() {
        let config = GpsConfig {
            serial_port: None,
            port_file: "/nonexistent/NMEAPORT".into(),
            ..GpsConfig::default()
        };
        let monitor = GpsMonitor::new(config, Arc::new(NeverOpens));
        assert!(matches!(
            monitor.init(Arc::new(Quiet)),
            Err(GpsError::TransportUnavailable(_))
        ));
        assert_eq!(monitor.status(), GpsStatus::Off);
    }
}
