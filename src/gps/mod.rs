// src/gps/mod.rs
//! NMEA parsing and fix accumulation

pub mod data;
pub mod fields;
pub mod fix;
pub mod nmea;
pub mod processor;
pub mod satellites;

pub use data::{GpsLocation, GpsStatus, LocationFlags, SvInfo, SvStatus};
pub use processor::NmeaProcessor;
