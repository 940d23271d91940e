//! Per-instance detection history.

use crate::core::grading::FlareRecord;
use crate::source::types::CHANNELS;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Values derived for one valid sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    /// Reading minus background mean
    pub signal: [f64; CHANNELS],
    /// Background mean at classification time
    pub mean: [f64; CHANNELS],
    /// Background standard deviation at classification time
    pub std: [f64; CHANNELS],
}

/// Everything one pipeline instance has derived from its input so far.
///
/// The per-sample vectors always have the same length, one entry per
/// sample fed. Flags of an unvalidated candidate episode are held by the
/// detector and are not part of [`DetectionRecord::flags`] until committed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Sample timestamps
    pub times: Vec<NaiveDateTime>,
    /// Derived values; `None` where the sample was missing
    pub derived: Vec<Option<Derived>>,
    /// Confidence counter after each sample
    pub confidence: Vec<usize>,
    /// Committed flags (vote count kept for in-flare samples, 0 otherwise)
    pub flags: Vec<u8>,
    /// Flares extracted at the last refresh
    pub flares: Vec<FlareRecord>,
}

impl DetectionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples recorded.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Timestamp of the most recent sample.
    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.times.last().copied()
    }

    /// Signal of one channel at every sample, NaN where missing.
    pub fn channel_signal(&self, channel: usize) -> Vec<f64> {
        self.derived
            .iter()
            .map(|d| d.map_or(f64::NAN, |d| d.signal[channel]))
            .collect()
    }

    /// Flare that is still open at the end of the record, if any.
    pub fn open_flare(&self) -> Option<&FlareRecord> {
        self.flares.last().filter(|f| f.is_in_progress())
    }
}
