// src/gps/data.rs
//! GPS data structures reported to the consumer

use bitflags::bitflags;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Capacity of a satellite report and of the active set.
pub const MAX_SVS: usize = 32;

bitflags! {
    /// Presence mask for the fields of a [`GpsLocation`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct LocationFlags: u16 {
        const LAT_LONG = 0x0001;
        const ALTITUDE = 0x0002;
        const SPEED = 0x0004;
        const BEARING = 0x0008;
        const ACCURACY = 0x0010;
        const TIMESTAMP = 0x0020;

        /// Fields that must all be present before a fix is reported.
        const REQUIRED = Self::LAT_LONG.bits()
            | Self::ALTITUDE.bits()
            | Self::SPEED.bits()
            | Self::BEARING.bits()
            | Self::ACCURACY.bits();
    }
}

/// A position fix. A value is only meaningful when its flag is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    pub flags: LocationFlags,
    pub latitude: f64,   // degrees, south negative
    pub longitude: f64,  // degrees, west negative
    pub altitude: f64,   // meters
    pub speed: f32,      // m/s
    pub bearing: f32,    // degrees
    pub accuracy: f32,   // dilution of precision reported by the receiver
    pub timestamp: i64,  // seconds since the Unix epoch
}

impl GpsLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, flags: LocationFlags) -> bool {
        self.flags.contains(flags)
    }

    /// True once every field in [`LocationFlags::REQUIRED`] is present
    pub fn is_complete(&self) -> bool {
        self.flags.contains(LocationFlags::REQUIRED)
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        if !self.has(LocationFlags::TIMESTAMP) {
            return None;
        }
        Utc.timestamp_opt(self.timestamp, 0).single()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One visible satellite
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SvInfo {
    pub prn: i32,        // -1 when the receiver sent a non-numeric id
    pub snr: f32,        // dB-Hz
    pub elevation: f32,  // degrees
    pub azimuth: f32,    // degrees
}

impl SvInfo {
    pub fn constellation(&self) -> &'static str {
        match self.prn {
            1..=32 => "GPS",
            33..=64 => "SBAS",
            65..=96 => "GLONASS",
            120..=163 => "BEIDOU",
            193..=197 => "QZSS",
            211..=246 => "GALILEO",
            _ => "UNKNOWN",
        }
    }

    pub fn signal_strength_description(&self) -> &'static str {
        match self.snr {
            snr if snr >= 40.0 => "Excellent",
            snr if snr >= 35.0 => "Good",
            snr if snr >= 25.0 => "Fair",
            snr if snr >= 15.0 => "Poor",
            snr if snr > 0.0 => "Very Poor",
            _ => "No signal",
        }
    }
}

/// Satellite visibility report assembled from a run of GSV messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvStatus {
    /// Number of satellites in view as announced by the receiver
    pub num_svs: usize,
    pub sv_list: [SvInfo; MAX_SVS],
    /// Bit `n - 1` is set when PRN `n` (1..=32) is used in the fix
    pub used_in_fix_mask: u32,
}

impl Default for SvStatus {
    fn default() -> Self {
        Self {
            num_svs: 0,
            sv_list: [SvInfo::default(); MAX_SVS],
            used_in_fix_mask: 0,
        }
    }
}

impl SvStatus {
    /// Entries that fall inside the announced visible count
    pub fn visible(&self) -> &[SvInfo] {
        &self.sv_list[..self.num_svs.min(MAX_SVS)]
    }

    pub fn is_used(&self, prn: i32) -> bool {
        (1..=32).contains(&prn) && self.used_in_fix_mask & (1 << (prn - 1)) != 0
    }

    pub fn satellites_used(&self) -> usize {
        self.used_in_fix_mask.count_ones() as usize
    }
}

/// Engine/session state reported through the status callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GpsStatus {
    #[default]
    Off,
    EngineOn,
    SessionBegin,
    SessionEnd,
}

impl std::fmt::Display for GpsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GpsStatus::Off => "off",
            GpsStatus::EngineOn => "engine on",
            GpsStatus::SessionBegin => "session begin",
            GpsStatus::SessionEnd => "session end",
        };
        f.write_str(name)
    }
}
