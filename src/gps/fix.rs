// src/gps/fix.rs
//! Accumulates fields from several sentence types into one position fix

use super::data::{GpsLocation, LocationFlags};
use super::fields::{self, FieldError};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::time::Duration;
use tracing::debug;

/// Date used to turn a bare time of day into a timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateContext {
    date: Option<NaiveDate>,
    utc_offset: i64,
}

impl DateContext {
    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Offset in seconds applied to the last resolved timestamp
    pub fn utc_offset(&self) -> i64 {
        self.utc_offset
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
    }

    /// Combine `time` with the known date, falling back to today's UTC date.
    ///
    /// The longitude based offset is a coarse approximation kept for
    /// compatibility with existing consumers.
    pub fn resolve(&mut self, time: NaiveTime, longitude: f64, now: DateTime<Utc>) -> i64 {
        let date = *self.date.get_or_insert_with(|| now.date_naive());
        self.utc_offset = fields::timezone_offset(longitude);
        Utc.from_utc_datetime(&date.and_time(time)).timestamp() + self.utc_offset
    }
}

/// Running fix, emptied each time a complete one is taken
#[derive(Debug, Clone, Default)]
pub struct FixAccumulator {
    location: GpsLocation,
    dates: DateContext,
    started: Option<DateTime<Utc>>,
    stale_after: Option<Duration>,
}

impl FixAccumulator {
    /// `stale_after` drops a partial fix whose first field is older than the limit.
    /// `None` keeps partial fixes until they complete.
    pub fn new(stale_after: Option<Duration>) -> Self {
        Self {
            stale_after,
            ..Self::default()
        }
    }

    pub fn location(&self) -> &GpsLocation {
        &self.location
    }

    pub fn dates(&self) -> &DateContext {
        &self.dates
    }

    pub fn set_latlong(
        &mut self,
        latitude: &[u8],
        latitude_hemi: &[u8],
        longitude: &[u8],
        longitude_hemi: &[u8],
    ) -> Result<(), FieldError> {
        let (lat, lon) = fields::parse_latlong(latitude, latitude_hemi, longitude, longitude_hemi)?;
        self.location.latitude = lat;
        self.location.longitude = lon;
        self.location.flags |= LocationFlags::LAT_LONG;
        Ok(())
    }

    pub fn set_altitude(&mut self, altitude: &[u8]) -> Result<(), FieldError> {
        self.location.altitude = fields::parse_altitude(altitude)?;
        self.location.flags |= LocationFlags::ALTITUDE;
        Ok(())
    }

    pub fn set_speed(&mut self, speed: &[u8]) -> Result<(), FieldError> {
        self.location.speed = fields::parse_speed(speed)?;
        self.location.flags |= LocationFlags::SPEED;
        Ok(())
    }

    /// An empty field keeps a bearing already present, otherwise records 0.0
    pub fn set_bearing(&mut self, bearing: &[u8]) {
        match fields::parse_bearing(bearing) {
            Some(value) => self.location.bearing = value,
            None if self.location.has(LocationFlags::BEARING) => return,
            None => self.location.bearing = 0.0,
        }
        self.location.flags |= LocationFlags::BEARING;
    }

    pub fn set_accuracy(&mut self, accuracy: &[u8]) -> Result<(), FieldError> {
        self.location.accuracy = fields::parse_accuracy(accuracy)?;
        self.location.flags |= LocationFlags::ACCURACY;
        Ok(())
    }

    pub fn set_time(&mut self, time: &[u8], now: DateTime<Utc>) -> Result<(), FieldError> {
        let time = fields::parse_time_of_day(time)?;
        self.location.timestamp = self.dates.resolve(time, self.location.longitude, now);
        self.location.flags |= LocationFlags::TIMESTAMP;
        Ok(())
    }

    /// Record the date, then resolve the time of day against it
    pub fn set_date_time(
        &mut self,
        date: &[u8],
        time: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), FieldError> {
        let date = fields::parse_date(date)?;
        self.dates.set_date(date);
        self.set_time(time, now)
    }

    /// Drop a partial fix that has been waiting longer than the configured limit
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> bool {
        let (Some(limit), Some(started)) = (self.stale_after, self.started) else {
            return false;
        };
        let age = now.signed_duration_since(started).to_std().unwrap_or_default();
        if age <= limit {
            return false;
        }

        debug!("Dropping partial fix {:?} after {:?}", self.location.flags, age);
        self.reset();
        true
    }

    /// Note when the current fix received its first field
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.started.is_none() && !self.location.is_empty() {
            self.started = Some(now);
        }
    }

    /// Hand out the fix once every required field is present, then start over
    pub fn take_complete(&mut self) -> Option<GpsLocation> {
        if !self.location.is_complete() {
            return None;
        }
        let fix = self.location;
        self.reset();
        Some(fix)
    }

    fn reset(&mut self) {
        self.location.reset();
        self.started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_time_falls_back_to_current_date() {
        let mut fix = FixAccumulator::new(None);
        fix.set_time(b"123519", now()).unwrap();

        let expected = Utc.with_ymd_and_hms(2024, 5, 17, 12, 35, 19).unwrap().timestamp();
        assert_eq!(fix.location().timestamp, expected);
        assert_eq!(fix.dates().date(), NaiveDate::from_ymd_opt(2024, 5, 17));
        assert!(fix.location().has(LocationFlags::TIMESTAMP));
    }

    #[test]
    fn test_date_time_applies_longitude_offset() {
        let mut fix = FixAccumulator::new(None);
        fix.set_latlong(b"4807.038", b"N", b"01131.000", b"E").unwrap();
        fix.set_date_time(b"230394", b"123519", now()).unwrap();

        let naive = Utc.with_ymd_and_hms(2094, 3, 23, 12, 35, 19).unwrap().timestamp();
        assert_eq!(fix.dates().utc_offset(), 7200);
        assert_eq!(fix.location().timestamp, naive + 7200);
    }

    #[test]
    fn test_bad_date_leaves_time_unset() {
        let mut fix = FixAccumulator::new(None);
        assert!(fix.set_date_time(b"2303", b"123519", now()).is_err());
        assert!(!fix.location().has(LocationFlags::TIMESTAMP));
        assert_eq!(fix.dates().date(), None);
    }

    #[test]
    fn test_failed_field_keeps_other_flags() {
        let mut fix = FixAccumulator::new(None);
        fix.set_altitude(b"545.4").unwrap();
        assert!(fix.set_speed(b"").is_err());
        assert_eq!(fix.location().flags, LocationFlags::ALTITUDE);
    }

    #[test]
    fn test_empty_bearing() {
        let mut fix = FixAccumulator::new(None);
        fix.set_bearing(b"");
        assert!(fix.location().has(LocationFlags::BEARING));
        assert_eq!(fix.location().bearing, 0.0);

        fix.set_bearing(b"084.4");
        fix.set_bearing(b"");
        assert_eq!(fix.location().bearing, 84.4);
    }

    #[test]
    fn test_take_complete_resets() {
        let mut fix = FixAccumulator::new(None);
        fix.set_latlong(b"4807.038", b"N", b"01131.000", b"E").unwrap();
        fix.set_altitude(b"545.4").unwrap();
        fix.set_speed(b"022.4").unwrap();
        fix.set_bearing(b"084.4");
        assert!(fix.take_complete().is_none());

        fix.set_accuracy(b"2.5").unwrap();
        let done = fix.take_complete().unwrap();
        assert!(done.is_complete());
        assert_eq!(done.altitude, 545.4);
        assert!(fix.location().is_empty());
        assert!(fix.take_complete().is_none());
    }

    #[test]
    fn test_partial_fix_held_without_limit() {
        let mut fix = FixAccumulator::new(None);
        fix.set_altitude(b"545.4").unwrap();
        fix.touch(now());
        assert!(!fix.expire_stale(now() + chrono::Duration::days(1)));
        assert!(fix.location().has(LocationFlags::ALTITUDE));
    }

    #[test]
    fn test_partial_fix_expires() {
        let mut fix = FixAccumulator::new(Some(Duration::from_secs(5)));
        fix.set_altitude(b"545.4").unwrap();
        fix.touch(now());
        assert!(!fix.expire_stale(now() + chrono::Duration::seconds(5)));
        assert!(fix.expire_stale(now() + chrono::Duration::seconds(6)));
        assert!(fix.location().is_empty());
    }
}
