// src/gps/satellites.rs
//! Satellite visibility reports stitched together from GSV/GSA sentences

use super::data::{SvInfo, SvStatus, MAX_SVS};
use super::fields::{self, FieldError};
use super::nmea::Sentence;
use tinyvec::ArrayVec;

/// Satellites reported per GSV message
const SATS_PER_MESSAGE: usize = 4;

/// Active set slots in a GSA sentence, starting at field 3
const ACTIVE_SET_FIELDS: usize = 12;

/// PRNs currently used in the position solution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsingSatellites {
    prns: ArrayVec<[u32; MAX_SVS]>,
}

impl UsingSatellites {
    /// Replace the set with the leading non-zero ids of `spans`
    pub fn rebuild<'a>(&mut self, spans: impl IntoIterator<Item = &'a [u8]>) {
        self.prns.clear();
        for span in spans {
            match fields::parse_int(span) {
                Some(prn) if prn > 0 => {
                    if self.prns.try_push(prn).is_some() {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    pub fn prns(&self) -> &[u32] {
        &self.prns
    }

    pub fn len(&self) -> usize {
        self.prns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prns.is_empty()
    }

    /// Bit `n - 1` for every PRN `n` in 1..=32; higher ids have no bit
    pub fn mask(&self) -> u32 {
        self.prns
            .iter()
            .filter(|&&prn| (1..=32).contains(&prn))
            .fold(0, |mask, &prn| mask | 1 << (prn - 1))
    }

    pub fn clear(&mut self) {
        self.prns.clear();
    }
}

/// Builds one [`SvStatus`] per navigation cycle
#[derive(Debug, Clone, Default)]
pub struct SatelliteAccumulator {
    report: SvStatus,
    using: UsingSatellites,
    received: u32,
}

impl SatelliteAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &SvStatus {
        &self.report
    }

    pub fn using(&self) -> &UsingSatellites {
        &self.using
    }

    /// Bit 0 for the active set, bit `n` for GSV message `n`
    pub fn received(&self) -> u32 {
        self.received
    }

    /// GSA: rebuild the active set from fields 3..=14
    pub fn update_active_set(&mut self, sentence: &Sentence<'_>) {
        self.using
            .rebuild((3..3 + ACTIVE_SET_FIELDS).map(|i| sentence.field(i)));
        self.received |= 1;
    }

    /// GSV: store this message's satellites at `4 * (index - 1)`.
    ///
    /// Returns how many slots the message filled.
    pub fn update_visible(&mut self, sentence: &Sentence<'_>) -> Result<usize, FieldError> {
        let index = fields::parse_int(sentence.field(2))
            .filter(|&index| index > 0)
            .ok_or(FieldError::Invalid("message index"))? as usize;
        let visible = fields::parse_int(sentence.field(3))
            .ok_or(FieldError::Invalid("satellites in view"))? as usize;

        if index < 32 {
            self.received |= 1 << index;
        }
        self.report.num_svs = visible;

        let offset = SATS_PER_MESSAGE.saturating_mul(index - 1);
        let count = visible.saturating_sub(offset).min(SATS_PER_MESSAGE);

        let mut filled = 0;
        for slot in 0..count {
            let Some(entry) = self.report.sv_list.get_mut(offset + slot) else {
                break;
            };
            let base = 4 + slot * 4;
            *entry = SvInfo {
                prn: fields::parse_int(sentence.field(base))
                    .and_then(|prn| i32::try_from(prn).ok())
                    .unwrap_or(-1),
                elevation: fields::parse_float(sentence.field(base + 1)) as f32,
                azimuth: fields::parse_float(sentence.field(base + 2)) as f32,
                snr: fields::parse_float(sentence.field(base + 3)) as f32,
            };
            filled += 1;
        }
        Ok(filled)
    }

    /// Finish the cycle: fold the active set into the report and start over
    pub fn flush(&mut self) -> SvStatus {
        self.report.used_in_fix_mask = self.using.mask();
        let report = std::mem::take(&mut self.report);
        self.using.clear();
        self.received = 0;
        report
    }
}
