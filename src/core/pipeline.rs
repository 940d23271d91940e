//! Fast and stable detection running side by side over the same input.
//!
//! The two instances differ only in their background window length. They
//! share no state, so each batch of lines is processed by both on separate
//! scoped threads; the outcome is the same as running them one after the
//! other.

use crate::config::DetectorConfig;
use crate::core::detector::{DetectError, Detector};
use crate::source::file::ScanLine;
use crate::source::types::Sample;
use serde::{Deserialize, Serialize};
use std::thread;

/// Counters describing how a batch of lines was consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSummary {
    /// Lines turned into samples
    pub accepted: usize,
    /// Lines that could not be parsed
    pub malformed: usize,
    /// Samples with a zero reading
    pub missing: usize,
    /// Lines not newer than the last accepted sample
    pub out_of_order: usize,
}

/// Feed a batch of lines to one detector and refresh its flare list.
///
/// Malformed lines and lines not newer than the last accepted sample are
/// skipped without touching the detector state, so a source that replays
/// lines it already delivered cannot feed a sample twice.
pub fn feed_detector(
    detector: &mut Detector,
    lines: &[ScanLine],
) -> Result<FeedSummary, DetectError> {
    let mut summary = FeedSummary::default();
    let mut last_time = detector.record().last_time();

    for line in lines {
        let sample = match Sample::parse_line(&line.text) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::debug!(position = line.position, "skipping malformed line: {e}");
                summary.malformed += 1;
                continue;
            }
        };

        if last_time.is_some_and(|t| sample.time <= t) {
            tracing::debug!(time = %sample.time, "skipping out-of-order line");
            summary.out_of_order += 1;
            continue;
        }

        if !sample.is_valid() {
            summary.missing += 1;
        }
        detector.process(&sample, line.position)?;
        last_time = Some(sample.time);
        summary.accepted += 1;
    }

    detector.refresh()?;
    Ok(summary)
}

/// The fast-trigger and stable-trigger detectors.
#[derive(Debug, Clone)]
pub struct DualPipeline {
    pub fast: Detector,
    pub slow: Detector,
}

impl DualPipeline {
    pub fn new(fast: DetectorConfig, slow: DetectorConfig) -> Self {
        Self {
            fast: Detector::new(fast),
            slow: Detector::new(slow),
        }
    }

    /// Process a batch of lines with both detectors concurrently.
    ///
    /// The returned summary is the fast instance's; both instances see
    /// identical input so their counters agree.
    pub fn feed(&mut self, lines: &[ScanLine]) -> Result<FeedSummary, DetectError> {
        let Self { fast, slow } = self;

        let (fast_result, slow_result) = thread::scope(|scope| {
            let slow_worker = scope.spawn(move || feed_detector(slow, lines));
            let fast_result = feed_detector(fast, lines);
            let slow_result = slow_worker
                .join()
                .unwrap_or(Err(DetectError::WorkerPanicked("slow")));
            (fast_result, slow_result)
        });

        slow_result?;
        fast_result
    }

    /// Start over, e.g. at the beginning of a new observing day.
    pub fn reset(&mut self) {
        self.fast = Detector::new(*self.fast.config());
        self.slow = Detector::new(*self.slow.config());
    }
}
