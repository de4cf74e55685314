// src/lib.rs
//! GPS Session Library
//!
//! Drives an NMEA GPS receiver over a serial port: reads and frames the
//! sentence stream on one thread, parses it into fixes and satellite
//! reports on another, and configures the receiver with acknowledged
//! AT commands.

pub mod callbacks;
pub mod command;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod gps;
pub mod logging;
pub mod monitor;
pub mod port;

// Re-export main types for convenience
pub use callbacks::{GpsCallbacks, NoopCallbacks};
pub use command::Command;
pub use config::GpsConfig;
pub use error::{GpsError, Result};
pub use gps::data::{GpsLocation, GpsStatus, LocationFlags, SvInfo, SvStatus};
pub use monitor::GpsMonitor;
pub use port::{Connector, SerialConnector, Transport};
