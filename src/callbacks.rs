// src/callbacks.rs
//! Consumer interface for fixes, satellite reports and status changes

use crate::gps::data::{GpsLocation, GpsStatus, SvStatus};
use chrono::{DateTime, Utc};

/// Receives everything the session produces.
///
/// Fix, satellite and sentence callbacks run on the dispatcher thread and
/// should return quickly; a slow consumer backs up the line buffer.
/// Status changes are the exception, see [`GpsCallbacks::on_status_change`].
pub trait GpsCallbacks: Send + Sync {
    fn on_fix(&self, fix: &GpsLocation);

    fn on_satellite_status(&self, status: &SvStatus);

    /// A recognized sentence, verbatim, with its receive time
    fn on_raw_sentence(&self, _received: DateTime<Utc>, _sentence: &str) {}

    /// Runs on whichever thread caused the transition: the caller of
    /// `init`/`start`/`stop`/`cleanup`, or the port reader when it gives
    /// up reopening the device and reports `Off`.
    fn on_status_change(&self, _status: GpsStatus) {}
}

/// Callbacks that drop everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl GpsCallbacks for NoopCallbacks {
    fn on_fix(&self, _fix: &GpsLocation) {}

    fn on_satellite_status(&self, _status: &SvStatus) {}
}
