//! Sample types for the flare monitor.
//!
//! A sample is one line of a flaretest scan file: a UT timestamp plus the
//! total-power reading of each of the three monitored frequency bands.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of flux channels carried by each sample.
pub const CHANNELS: usize = 3;

/// Column holding the first channel reading.
const FIRST_CHANNEL_COLUMN: usize = 3;

/// Suppression length (in lines) at the start of a scan.
const SCAN_START_SUPPRESSION: usize = 120;

/// Suppression length used before 14:00 UT, when the antennas settle slower.
const EARLY_SCAN_START_SUPPRESSION: usize = 240;

/// Time of day before which the longer suppression window applies.
const EARLY_SCAN_HOUR: u32 = 14;

/// Errors raised while parsing a sample line.
#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("expected at least {expected} columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },
    #[error("invalid date column {0:?}")]
    BadDate(String),
    #[error("invalid time column {0:?}")]
    BadTime(String),
    #[error("invalid reading {value:?} in column {column}")]
    BadReading { column: usize, value: String },
}

/// A single 3-channel flux sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// UT timestamp of the sample
    pub time: NaiveDateTime,
    /// Per-channel readings; an exact zero marks a missing reading
    pub flux: [f64; CHANNELS],
}

impl Sample {
    pub fn new(time: NaiveDateTime, flux: [f64; CHANNELS]) -> Self {
        Self { time, flux }
    }

    /// Parse one whitespace-separated data line.
    ///
    /// Column 0 is the date (`YYYYMMDD`), column 1 the time (`HHMMSS[.sss]`)
    /// and columns 3 to 5 the channel readings. Other columns are ignored.
    /// Non-finite readings (`nan`, `inf`) make the line malformed.
    pub fn parse_line(line: &str) -> Result<Self, SampleError> {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let expected = FIRST_CHANNEL_COLUMN + CHANNELS;
        if cols.len() < expected {
            return Err(SampleError::TooFewColumns {
                expected,
                found: cols.len(),
            });
        }

        let time = parse_timestamp(cols[0], cols[1])?;

        let mut flux = [0.0; CHANNELS];
        for (i, reading) in flux.iter_mut().enumerate() {
            let column = FIRST_CHANNEL_COLUMN + i;
            *reading = cols[column]
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| SampleError::BadReading {
                    column,
                    value: cols[column].to_string(),
                })?;
        }

        Ok(Self { time, flux })
    }

    /// A sample is usable only when no channel reads exactly zero.
    pub fn is_valid(&self) -> bool {
        self.flux.iter().all(|&v| v != 0.0)
    }

    /// Number of leading scan lines whose votes are ignored.
    pub fn suppression_lines(&self) -> usize {
        if self.time.hour() < EARLY_SCAN_HOUR {
            EARLY_SCAN_START_SUPPRESSION
        } else {
            SCAN_START_SUPPRESSION
        }
    }
}

/// Combine the date and time columns into a timestamp.
pub fn parse_timestamp(date: &str, time: &str) -> Result<NaiveDateTime, SampleError> {
    let day = NaiveDate::parse_from_str(date, "%Y%m%d")
        .map_err(|_| SampleError::BadDate(date.to_string()))?;

    let (whole, fraction) = match time.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (time, None),
    };
    let bad_time = || SampleError::BadTime(time.to_string());

    let clock = NaiveTime::parse_from_str(whole, "%H%M%S").map_err(|_| bad_time())?;
    let mut stamp = day.and_time(clock);

    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad_time());
        }
        let secs: f64 = format!("0.{fraction}").parse().map_err(|_| bad_time())?;
        stamp += Duration::microseconds((secs * 1e6).round() as i64);
    }

    Ok(stamp)
}

/// Observing day a timestamp belongs to.
///
/// The solar day runs across UT midnight, so times earlier than 12 UT are
/// attributed to the previous date.
pub fn observing_day(time: NaiveDateTime) -> NaiveDate {
    (time - Duration::hours(12)).date()
}
