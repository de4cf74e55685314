// src/gps/fields.rs
//! Typed values from raw NMEA field spans

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

/// Knots to meters per second
const KNOTS_TO_MPS: f64 = 1.852 / 3.6;

/// Spans this long or longer are not parsed as floats
const MAX_FLOAT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0} field too short")]
    TooShort(&'static str),
    #[error("{0} field has an invalid value")]
    Invalid(&'static str),
}

/// Parse a run of ASCII digits. An empty span is zero; any other byte is invalid.
pub fn parse_int(span: &[u8]) -> Option<u32> {
    span.iter().try_fold(0u32, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
    })
}

/// Parse a signed decimal, falling back to 0.0
pub fn parse_float(span: &[u8]) -> f64 {
    if span.len() >= MAX_FLOAT_LEN {
        return 0.0;
    }
    std::str::from_utf8(span)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Convert a `DDDMM.mmmm` span to decimal degrees
pub fn parse_coordinate(span: &[u8]) -> f64 {
    let value = parse_float(span);
    let degrees = (value.floor() / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    degrees + minutes / 60.0
}

/// Latitude and longitude with their hemisphere indicators
pub fn parse_latlong(
    latitude: &[u8],
    latitude_hemi: &[u8],
    longitude: &[u8],
    longitude_hemi: &[u8],
) -> Result<(f64, f64), FieldError> {
    if latitude.len() < 6 {
        return Err(FieldError::TooShort("latitude"));
    }
    let mut lat = parse_coordinate(latitude);
    if latitude_hemi.first() == Some(&b'S') {
        lat = -lat;
    }

    if longitude.len() < 6 {
        return Err(FieldError::TooShort("longitude"));
    }
    let mut lon = parse_coordinate(longitude);
    if longitude_hemi.first() == Some(&b'W') {
        lon = -lon;
    }

    Ok((lat, lon))
}

pub fn parse_altitude(span: &[u8]) -> Result<f64, FieldError> {
    if span.is_empty() {
        return Err(FieldError::TooShort("altitude"));
    }
    Ok(parse_float(span))
}

/// Speed over ground in m/s from a knots field
pub fn parse_speed(span: &[u8]) -> Result<f32, FieldError> {
    if span.is_empty() {
        return Err(FieldError::TooShort("speed"));
    }
    Ok((KNOTS_TO_MPS * parse_float(span)) as f32)
}

pub fn parse_accuracy(span: &[u8]) -> Result<f32, FieldError> {
    if span.is_empty() {
        return Err(FieldError::TooShort("accuracy"));
    }
    Ok(parse_float(span) as f32)
}

/// Course over ground; `None` when the receiver left the field empty
pub fn parse_bearing(span: &[u8]) -> Option<f32> {
    if span.is_empty() {
        None
    } else {
        Some(parse_float(span) as f32)
    }
}

/// `DDMMYY` date, years counted from 2000
pub fn parse_date(span: &[u8]) -> Result<NaiveDate, FieldError> {
    if span.len() != 6 {
        return Err(FieldError::TooShort("date"));
    }
    let day = parse_int(&span[0..2]);
    let month = parse_int(&span[2..4]);
    let year = parse_int(&span[4..6]);

    match (day, month, year) {
        (Some(day), Some(month), Some(year)) => {
            NaiveDate::from_ymd_opt(2000 + year as i32, month, day)
                .ok_or(FieldError::Invalid("date"))
        }
        _ => Err(FieldError::Invalid("date")),
    }
}

/// `HHMMSS[.sss]` time of day, fractional seconds dropped
pub fn parse_time_of_day(span: &[u8]) -> Result<NaiveTime, FieldError> {
    if span.len() < 6 {
        return Err(FieldError::TooShort("time"));
    }
    let hour = parse_int(&span[0..2]).ok_or(FieldError::Invalid("time"))?;
    let minute = parse_int(&span[2..4]).ok_or(FieldError::Invalid("time"))?;
    let seconds = parse_float(&span[4..]);
    if !(0.0..60.0).contains(&seconds) {
        return Err(FieldError::Invalid("time"));
    }

    NaiveTime::from_hms_opt(hour, minute, seconds as u32).ok_or(FieldError::Invalid("time"))
}

/// Rough local offset in seconds derived from longitude, one hour per 15 degrees.
///
/// This is not a timezone lookup: the result ignores political zones and DST.
pub fn timezone_offset(longitude: f64) -> i64 {
    if longitude == 0.0 || !longitude.is_finite() {
        return 0;
    }
    let hours = ((longitude.abs() - 7.5) / 15.0 + 1.0).ceil();
    (longitude.signum() * hours) as i64 * 3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(b"08"), Some(8));
        assert_eq!(parse_int(b"123"), Some(123));
        assert_eq!(parse_int(b""), Some(0));
        assert_eq!(parse_int(b"1a"), None);
        assert_eq!(parse_int(b"-1"), None);
        assert_eq!(parse_int(b"99999999999"), None);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(b"545.4"), 545.4);
        assert_eq!(parse_float(b"-12.5"), -12.5);
        assert_eq!(parse_float(b""), 0.0);
        assert_eq!(parse_float(b"abc"), 0.0);
        assert_eq!(parse_float(b"1234567890.123456"), 0.0);
    }

    #[test]
    fn test_latlong_munich() {
        let (lat, lon) = parse_latlong(b"4807.038", b"N", b"01131.000", b"E").unwrap();
        assert!((lat - 48.1173).abs() < 1e-4);
        assert!((lon - 11.516_666).abs() < 1e-4);
    }

    #[test]
    fn test_latlong_hemispheres() {
        let (lat, lon) = parse_latlong(b"3351.000", b"S", b"15112.000", b"W").unwrap();
        assert!((lat + 33.85).abs() < 1e-9);
        assert!((lon + 151.2).abs() < 1e-9);
    }

    #[test]
    fn test_latlong_too_short() {
        assert_eq!(
            parse_latlong(b"480.0", b"N", b"01131.000", b"E").unwrap_err(),
            FieldError::TooShort("latitude")
        );
        assert_eq!(
            parse_latlong(b"4807.038", b"N", b"", b"E").unwrap_err(),
            FieldError::TooShort("longitude")
        );
    }

    #[test]
    fn test_speed_conversion() {
        let speed = parse_speed(b"022.4").unwrap();
        assert!((speed - 11.523_556).abs() < 1e-4);
        assert!(parse_speed(b"").is_err());
    }

    #[test]
    fn test_bearing() {
        assert_eq!(parse_bearing(b"084.4"), Some(84.4));
        assert_eq!(parse_bearing(b""), None);
    }

    #[test]
    fn test_date() {
        assert_eq!(parse_date(b"230394").unwrap(), NaiveDate::from_ymd_opt(2094, 3, 23).unwrap());
        assert_eq!(parse_date(b"2303944").unwrap_err(), FieldError::TooShort("date"));
        assert_eq!(parse_date(b"23x394").unwrap_err(), FieldError::Invalid("date"));
        assert_eq!(parse_date(b"321394").unwrap_err(), FieldError::Invalid("date"));
    }

    #[test]
    fn test_time_of_day() {
        assert_eq!(
            parse_time_of_day(b"123519").unwrap(),
            NaiveTime::from_hms_opt(12, 35, 19).unwrap()
        );
        assert_eq!(
            parse_time_of_day(b"235959.75").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap()
        );
        assert!(parse_time_of_day(b"1235").is_err());
        assert!(parse_time_of_day(b"2a3519").is_err());
        assert!(parse_time_of_day(b"253519").is_err());
    }

    #[test]
    fn test_timezone_offset() {
        assert_eq!(timezone_offset(0.0), 0);
        assert_eq!(timezone_offset(5.0), 3600);
        assert_eq!(timezone_offset(11.5167), 7200);
        assert_eq!(timezone_offset(-74.0), -6 * 3600);
        assert_eq!(timezone_offset(121.5), 9 * 3600);
    }
}
