//! Flare extraction and per-channel severity grading.
//!
//! Each clean in-flare interval becomes one [`FlareRecord`]. The peak is the
//! median of the per-channel maxima, and each channel is graded by how far
//! its peak rises above the pre-flare background, on a 0-5 logarithmic scale.

use crate::config::DetectorConfig;
use crate::core::detector::DetectError;
use crate::core::record::DetectionRecord;
use crate::core::segments::segments;
use crate::source::types::CHANNELS;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Fixed noise floor added to the background std of each channel.
pub const NOISE_FLOOR: [f64; CHANNELS] = [2000.0, 500.0, 100.0];

/// Highest severity grade.
pub const MAX_SEVERITY: u8 = 5;

/// Grade of one channel of a flare.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelGrade {
    /// Severity, 0 (insignificant) to 5
    pub severity: u8,
    /// Peak signal above the pre-flare background mean
    pub peak_excess: f64,
    /// Fluctuation of the signal after the peak
    pub decay_std: f64,
}

/// A detected flare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlareRecord {
    pub start: NaiveDateTime,
    pub peak: NaiveDateTime,
    /// End time; `None` while the flare is still in progress
    pub end: Option<NaiveDateTime>,
    /// Last timestamp seen while the flare was still open
    pub in_progress: Option<NaiveDateTime>,
    /// Sample index of the first in-flare sample
    pub start_index: usize,
    /// Sample index of the representative peak
    pub peak_index: usize,
    pub grades: [ChannelGrade; CHANNELS],
}

impl FlareRecord {
    pub fn is_in_progress(&self) -> bool {
        self.end.is_none()
    }

    /// Severity of each channel.
    pub fn severities(&self) -> [u8; CHANNELS] {
        self.grades.map(|g| g.severity)
    }

    /// Identifier derived from the peak time, e.g. `20240514T183512`.
    pub fn flare_id(&self) -> String {
        self.peak.format("%Y%m%dT%H%M%S").to_string()
    }
}

/// Build flare records from a clean in-flare sequence.
///
/// `clean` must have one entry per sample of `record`.
pub fn extract_flares(
    clean: &[bool],
    record: &DetectionRecord,
    config: &DetectorConfig,
) -> Result<Vec<FlareRecord>, DetectError> {
    let len = record.len();
    if clean.len() != len || record.confidence.len() != len || record.derived.len() != len {
        return Err(DetectError::Misaligned {
            flags: clean.len(),
            samples: len,
            confidence: record.confidence.len(),
        });
    }
    let signals: Vec<Vec<f64>> = (0..CHANNELS).map(|ch| record.channel_signal(ch)).collect();

    let flares = segments(clean)
        .into_iter()
        .map(|segment| {
            let start = segment.start;
            let end = segment.end_or(len);

            let channel_peaks: Vec<Option<usize>> = signals
                .iter()
                .map(|signal| argmax(&signal[start..end]).map(|i| start + i))
                .collect();
            let peak_index = median_index(&channel_peaks).unwrap_or(start);

            let mut grades = [ChannelGrade {
                severity: 0,
                peak_excess: f64::NAN,
                decay_std: f64::NAN,
            }; CHANNELS];
            for (ch, grade) in grades.iter_mut().enumerate() {
                let signal = &signals[ch];
                let background = &signal[start.saturating_sub(config.nbgnd)..start];
                let peak_value = channel_peaks[ch].map_or(f64::NAN, |i| signal[i]);
                let decay_from = (peak_index + config.nflare).min(end);
                *grade = grade_channel(
                    peak_value,
                    background,
                    &signal[decay_from..end],
                    NOISE_FLOOR[ch],
                );
            }

            FlareRecord {
                start: record.times[start],
                peak: record.times[peak_index],
                end: segment.end.map(|e| record.times[e]),
                in_progress: if segment.is_open() {
                    record.times.get(len - 1).copied()
                } else {
                    None
                },
                start_index: start,
                peak_index,
                grades,
            }
        })
        .collect();
    Ok(flares)
}

/// Grade one channel from its peak value and pre-flare background.
pub fn grade_channel(
    peak_value: f64,
    background: &[f64],
    decay: &[f64],
    noise_floor: f64,
) -> ChannelGrade {
    let bgnd_mean = finite(background).mean();
    let bgnd_std = finite(background).population_std_dev();
    let peak_excess = peak_value - bgnd_mean;

    let nstd = (peak_excess / (bgnd_std + noise_floor)).log10();
    let severity = if nstd.is_finite() {
        (2.0 * nstd).round().clamp(0.0, MAX_SEVERITY as f64) as u8
    } else {
        0
    };

    ChannelGrade {
        severity,
        peak_excess,
        decay_std: finite(decay).population_std_dev(),
    }
}

fn finite(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| !v.is_nan())
}

/// Index of the largest non-missing value.
fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Median of the available per-channel peak indices (lower middle when even).
fn median_index(indices: &[Option<usize>]) -> Option<usize> {
    let mut found: Vec<usize> = indices.iter().flatten().copied().collect();
    if found.is_empty() {
        return None;
    }
    found.sort_unstable();
    Some(found[(found.len() - 1) / 2])
}
