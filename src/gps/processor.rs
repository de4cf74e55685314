// src/gps/processor.rs
//! Per-sentence parsing pipeline driven by the dispatcher thread

use super::{
    data::GpsLocation,
    fields::FieldError,
    fix::FixAccumulator,
    nmea::{Sentence, SentenceError, SentenceType},
    satellites::SatelliteAccumulator,
};
use crate::callbacks::GpsCallbacks;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Owns all parsing state. Only the dispatcher thread touches it.
#[derive(Debug, Default)]
pub struct NmeaProcessor {
    fix: FixAccumulator,
    satellites: SatelliteAccumulator,
}

impl NmeaProcessor {
    pub fn new(fix_stale_after: Option<Duration>) -> Self {
        Self {
            fix: FixAccumulator::new(fix_stale_after),
            satellites: SatelliteAccumulator::new(),
        }
    }

    pub fn location(&self) -> &GpsLocation {
        self.fix.location()
    }

    pub fn satellites(&self) -> &SatelliteAccumulator {
        &self.satellites
    }

    /// Parse one line (without CR LF) and report whatever it completes.
    ///
    /// Malformed or unrecognized lines leave all state untouched.
    pub fn process_line(
        &mut self,
        line: &[u8],
        now: DateTime<Utc>,
        sink: &dyn GpsCallbacks,
    ) -> Result<SentenceType, SentenceError> {
        let sentence = Sentence::parse(line)?;
        sink.on_raw_sentence(now, &String::from_utf8_lossy(line));

        self.fix.expire_stale(now);

        match sentence.kind() {
            SentenceType::Gga => self.parse_gga(&sentence, now),
            SentenceType::Gsa => self.parse_gsa(&sentence),
            SentenceType::Gsv => self.parse_gsv(&sentence),
            SentenceType::Vtg => self.parse_vtg(&sentence),
            SentenceType::Rmc => self.parse_rmc(&sentence, now, sink),
        }

        self.fix.touch(now);
        if let Some(fix) = self.fix.take_complete() {
            debug!(
                "Location info: lat={} lon={} altitude={} speed={} bearing={} accuracy={} time={}",
                fix.latitude,
                fix.longitude,
                fix.altitude,
                fix.speed,
                fix.bearing,
                fix.accuracy,
                fix.timestamp
            );
            sink.on_fix(&fix);
        }

        Ok(sentence.kind())
    }

    /// GGA: position, altitude and time of day
    fn parse_gga(&mut self, s: &Sentence<'_>, now: DateTime<Utc>) {
        note(s, self.fix.set_latlong(s.field(2), s.field(3), s.field(4), s.field(5)));
        note(s, self.fix.set_altitude(s.field(9)));
        note(s, self.fix.set_time(s.field(1), now));
    }

    /// GSA: accuracy and the active satellite set
    fn parse_gsa(&mut self, s: &Sentence<'_>) {
        note(s, self.fix.set_accuracy(s.field(15)));
        self.satellites.update_active_set(s);
    }

    /// GSV: one part of the satellites in view
    fn parse_gsv(&mut self, s: &Sentence<'_>) {
        match self.satellites.update_visible(s) {
            Ok(count) => debug!(
                "satellites visible = {} message index = {:?} filled = {}",
                self.satellites.report().num_svs,
                String::from_utf8_lossy(s.field(2)),
                count
            ),
            Err(e) => note(s, Err(e)),
        }
    }

    /// VTG: course and speed over ground
    fn parse_vtg(&mut self, s: &Sentence<'_>) {
        self.fix.set_bearing(s.field(1));
        note(s, self.fix.set_speed(s.field(5)));
    }

    /// RMC: full fix when the status is valid, and closes the satellite cycle
    fn parse_rmc(&mut self, s: &Sentence<'_>, now: DateTime<Utc>, sink: &dyn GpsCallbacks) {
        let valid = s.field(2).first() == Some(&b'A');
        debug!("fixStatus={}", if valid { 'A' } else { 'V' });

        if valid {
            note(s, self.fix.set_latlong(s.field(3), s.field(4), s.field(5), s.field(6)));
            note(s, self.fix.set_date_time(s.field(9), s.field(1), now));
            self.fix.set_bearing(s.field(8));
            note(s, self.fix.set_speed(s.field(7)));
        }

        let received = self.satellites.received();
        let report = self.satellites.flush();
        debug!(
            "Satellite report: {} in view, used mask {:#010x}, parts {:#b}",
            report.num_svs, report.used_in_fix_mask, received
        );
        sink.on_satellite_status(&report);
    }
}

fn note(sentence: &Sentence<'_>, result: Result<(), FieldError>) {
    if let Err(e) = result {
        debug!("{}: {}", sentence.kind(), e);
    }
}
