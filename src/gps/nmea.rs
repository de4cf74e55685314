// src/gps/nmea.rs
//! NMEA sentence envelope validation and tokenizing

use std::fmt;
use thiserror::Error;
use tinyvec::ArrayVec;

/// Fields beyond this count are ignored
pub const MAX_FIELDS: usize = 20;

/// `$` + 5 byte tag + `*` + checksum is the shortest line worth looking at
const MIN_SENTENCE_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SentenceError {
    #[error("line of {0} bytes is too short for a sentence")]
    TooShort(usize),
    #[error("malformed sentence envelope")]
    MalformedEnvelope,
    #[error("sentence tag too short")]
    TagTooShort,
    #[error("unrecognized sentence type {0:?}")]
    UnrecognizedType(String),
}

/// Sentence types the session understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentenceType {
    /// Global positioning system fix data
    Gga,
    /// DOP and active satellites
    Gsa,
    /// Satellites in view
    Gsv,
    /// Course over ground and ground speed
    Vtg,
    /// Recommended minimum navigation information
    Rmc,
}

impl SentenceType {
    pub fn from_code(code: &[u8]) -> Option<Self> {
        match code {
            b"GGA" => Some(SentenceType::Gga),
            b"GSA" => Some(SentenceType::Gsa),
            b"GSV" => Some(SentenceType::Gsv),
            b"VTG" => Some(SentenceType::Vtg),
            b"RMC" => Some(SentenceType::Rmc),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SentenceType::Gga => "GGA",
            SentenceType::Gsa => "GSA",
            SentenceType::Gsv => "GSV",
            SentenceType::Vtg => "VTG",
            SentenceType::Rmc => "RMC",
        }
    }
}

impl fmt::Display for SentenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A tokenized sentence. Fields borrow from the line they were split from.
#[derive(Debug, Clone)]
pub struct Sentence<'a> {
    raw: &'a [u8],
    kind: SentenceType,
    fields: ArrayVec<[&'a [u8]; MAX_FIELDS]>,
}

impl<'a> Sentence<'a> {
    /// Validate the envelope of `line` (without CR LF) and split it into fields
    pub fn parse(line: &'a [u8]) -> Result<Self, SentenceError> {
        let fields = split_fields(line)?;

        let tag = fields.first().copied().unwrap_or_default();
        if tag.len() < 5 {
            return Err(SentenceError::TagTooShort);
        }

        // Skip the two byte talker id
        let code = &tag[2..5];
        let kind = SentenceType::from_code(code).ok_or_else(|| {
            SentenceError::UnrecognizedType(String::from_utf8_lossy(code).into_owned())
        })?;

        Ok(Self {
            raw: line,
            kind,
            fields,
        })
    }

    pub fn kind(&self) -> SentenceType {
        self.kind
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn talker(&self) -> &'a [u8] {
        &self.fields[0][..2]
    }

    /// Field at `index`, or an empty span when the sentence has fewer fields
    pub fn field(&self, index: usize) -> &'a [u8] {
        self.fields.get(index).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Check the `$...*hh` envelope and split the body on commas.
///
/// The checksum itself is not verified, only the position of its delimiter.
pub fn split_fields(line: &[u8]) -> Result<ArrayVec<[&[u8]; MAX_FIELDS]>, SentenceError> {
    if line.len() < MIN_SENTENCE_LEN {
        return Err(SentenceError::TooShort(line.len()));
    }

    let star = line.len() - 3;
    if line[0] != b'$' || line[star] != b'*' {
        return Err(SentenceError::MalformedEnvelope);
    }

    let mut fields = ArrayVec::new();
    fields.extend(line[1..star].split(|&b| b == b',').take(MAX_FIELDS));
    Ok(fields)
}
