//! Per-sample flare classification with hysteresis.
//!
//! Every valid sample is compared against the background window; each
//! channel rising more than `nsigma` standard deviations above its mean casts
//! a vote. A bounded confidence counter integrates the votes so that a flare
//! is only declared after `nflare` flare-like samples, and decays again when
//! the emission returns to background.
//!
//! Once a candidate episode has accumulated `nbgnd` flare-like samples it is
//! checked for being a mere level change of the receiver: a real flare
//! fluctuates far more than the quiet background does. Episodes failing the
//! check are discarded and the background is re-based on the new level.
//!
//! Flags of an episode awaiting that check are kept pending and only
//! committed to the [`DetectionRecord`] once the outcome is known.

use crate::config::DetectorConfig;
use crate::core::background::{BackgroundStats, BackgroundWindow};
use crate::core::grading::extract_flares;
use crate::core::record::{DetectionRecord, Derived};
use crate::core::segments::refine;
use crate::source::types::{Sample, CHANNELS};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

/// Ratio between flare and background fluctuation required by the level check.
const LEVEL_CHECK_RATIO: f64 = 2.5;

/// Channels that must pass the level check for a flare to be confirmed.
const LEVEL_CHECK_VOTES: usize = 2;

/// Votes a sample needs to count as flare-like.
const FLARE_VOTES: u8 = 2;

/// Errors raised by the detection pipeline.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detection history misaligned: {flags} flags, {samples} samples, {confidence} confidence values")]
    Misaligned {
        flags: usize,
        samples: usize,
        confidence: usize,
    },
    #[error("{0} pipeline worker panicked")]
    WorkerPanicked(&'static str),
}

/// Coarse state of the confidence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlareState {
    /// Background window still filling
    WarmingUp,
    /// Confidence at zero
    Quiet,
    /// Confidence building up or decaying
    Rising,
    /// Confidence at its ceiling
    Confirmed,
}

/// An open run of flare-like samples.
#[derive(Debug, Clone)]
struct Episode {
    /// First `nbgnd` flare-like readings of the episode
    candidates: Vec<[f64; CHANNELS]>,
    /// Number of flare-like readings seen in the episode
    count: usize,
    /// Flags awaiting the level check; `None` once committed
    pending: Option<Vec<u8>>,
}

impl Episode {
    fn new(capacity: usize) -> Self {
        Self {
            candidates: Vec::with_capacity(capacity),
            count: 0,
            pending: Some(Vec::new()),
        }
    }

    fn admit(&mut self, flux: [f64; CHANNELS], capacity: usize) {
        if self.candidates.len() < capacity {
            self.candidates.push(flux);
        }
        self.count += 1;
    }

    fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }
}

/// One flare detection pipeline instance.
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectorConfig,
    background: BackgroundWindow,
    record: DetectionRecord,
    inflare: usize,
    episode: Option<Episode>,
}

impl Detector {
    /// Create a detector with the given tunables.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            background: BackgroundWindow::new(config.nbgnd),
            config,
            record: DetectionRecord::new(),
            inflare: 0,
            episode: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn background(&self) -> &BackgroundWindow {
        &self.background
    }

    /// Committed detection history.
    pub fn record(&self) -> &DetectionRecord {
        &self.record
    }

    /// Current value of the confidence counter.
    pub fn confidence(&self) -> usize {
        self.inflare
    }

    pub fn state(&self) -> FlareState {
        if !self.background.is_full() {
            FlareState::WarmingUp
        } else if self.inflare == 0 {
            FlareState::Quiet
        } else if self.inflare >= self.config.nflare {
            FlareState::Confirmed
        } else {
            FlareState::Rising
        }
    }

    /// Full flag history: committed flags followed by pending ones.
    pub fn flags(&self) -> Vec<u8> {
        let mut flags = self.record.flags.clone();
        if let Some(pending) = self.episode.as_ref().and_then(|e| e.pending.as_ref()) {
            flags.extend_from_slice(pending);
        }
        flags
    }

    /// Flag emitted for the most recent sample.
    pub fn last_flag(&self) -> u8 {
        self.episode
            .as_ref()
            .and_then(|e| e.pending.as_ref())
            .and_then(|p| p.last().copied())
            .or_else(|| self.record.flags.last().copied())
            .unwrap_or(0)
    }

    /// Process one sample located at 1-based `position` within its scan.
    ///
    /// Returns the flag emitted for the sample. Flags of a candidate episode
    /// may still be withdrawn if the episode turns out to be a level change.
    pub fn process(&mut self, sample: &Sample, position: usize) -> Result<u8, DetectError> {
        let flag = if sample.is_valid() {
            self.process_valid(sample, position)
        } else {
            self.process_missing(sample)
        };
        self.check_alignment()?;
        Ok(flag)
    }

    /// Re-derive the flare list from the current flag history.
    pub fn refresh(&mut self) -> Result<(), DetectError> {
        let flags = self.flags();
        let clean = refine(&flags, self.config.nflare, self.config.nbgnd);
        self.record.flares = extract_flares(&clean, &self.record, &self.config)?;
        Ok(())
    }

    fn process_missing(&mut self, sample: &Sample) -> u8 {
        let flag = self.last_flag();
        self.push_sample(sample, None);
        self.emit(flag);
        flag
    }

    fn process_valid(&mut self, sample: &Sample, position: usize) -> u8 {
        let flux = sample.flux;

        if !self.background.is_full() {
            self.background.push(flux);
            let derived = derive(flux, &self.background.stats());
            self.push_sample(sample, Some(derived));
            self.emit(0);
            return 0;
        }

        let stats = self.background.stats();
        let mut votes = count_votes(flux, &stats, self.config.nsigma);
        if position < sample.suppression_lines() {
            votes = 0;
        }
        self.push_sample(sample, Some(derive(flux, &stats)));

        if votes < FLARE_VOTES {
            self.inflare = self.inflare.saturating_sub(1);
            self.background.push(flux);
            self.emit(0);
            if self.inflare == 0 {
                self.close_episode(false);
            }
            return 0;
        }

        let nbgnd = self.config.nbgnd;
        let nflare = self.config.nflare;
        let previous_flag = self.last_flag();

        if self.inflare == 0 || self.episode.is_none() {
            self.episode = Some(Episode::new(nbgnd));
        }
        let count = match self.episode.as_mut() {
            Some(episode) => {
                episode.admit(flux, nbgnd);
                episode.count
            }
            None => 0,
        };
        self.inflare = (self.inflare + 1).min(nflare);

        if self.inflare == nflare {
            if count == nbgnd {
                if self.passes_level_check(sample) {
                    self.emit(votes);
                    self.commit_validated();
                    return votes;
                }
                self.reject_episode(sample);
                return 0;
            }
            self.emit(votes);
            votes
        } else if previous_flag != 0 && self.inflare * 2 > nflare {
            self.emit(votes);
            votes
        } else {
            self.emit(0);
            0
        }
    }

    /// Compare the fluctuation of the candidate readings with the background.
    fn passes_level_check(&self, sample: &Sample) -> bool {
        let Some(episode) = self.episode.as_ref() else {
            return false;
        };
        let stats = self.background.stats();
        let tail = episode
            .candidates
            .get(self.config.nflare..)
            .unwrap_or_default();

        let mut votes = 0;
        for ch in 0..CHANNELS {
            let f_mean = tail.iter().map(|r| r[ch]).mean();
            let f_std = tail.iter().map(|r| r[ch]).population_std_dev();
            let b_std = stats.std[ch];
            tracing::debug!(
                time = %sample.time,
                channel = ch,
                b_mean = stats.mean[ch],
                f_mean,
                b_std,
                f_std,
                "level check"
            );
            if f_std > LEVEL_CHECK_RATIO * b_std {
                votes += 1;
            }
        }

        let passed = votes >= LEVEL_CHECK_VOTES;
        tracing::info!(
            time = %sample.time,
            nbgnd = self.config.nbgnd,
            votes,
            "{}",
            if passed {
                "flare confirmed"
            } else {
                "level change rejected, re-basing background"
            }
        );
        passed
    }

    /// Discard a level-change episode and adopt its readings as background.
    fn reject_episode(&mut self, sample: &Sample) {
        if let Some(episode) = self.episode.as_ref() {
            self.background.replace_with(&episode.candidates);
        }
        tracing::debug!(time = %sample.time, "background re-based");
        self.inflare = 0;
        self.emit(0);
        self.close_episode(true);
    }

    /// Commit the pending flags of a validated episode; the episode stays open.
    fn commit_validated(&mut self) {
        if let Some(pending) = self.episode.as_mut().and_then(|e| e.pending.take()) {
            self.record.flags.extend(pending);
        }
    }

    /// End the current episode, committing (or zeroing) its pending flags.
    fn close_episode(&mut self, withdraw: bool) {
        if let Some(episode) = self.episode.take() {
            if let Some(pending) = episode.pending {
                if withdraw {
                    self.record.flags.extend(std::iter::repeat(0).take(pending.len()));
                } else {
                    self.record.flags.extend(pending);
                }
            }
        }
    }

    fn push_sample(&mut self, sample: &Sample, derived: Option<Derived>) {
        self.record.times.push(sample.time);
        self.record.derived.push(derived);
    }

    /// Emit the flag and confidence of the sample just pushed.
    fn emit(&mut self, flag: u8) {
        self.record.confidence.push(self.inflare);
        match self.episode.as_mut().and_then(|e| e.pending.as_mut()) {
            Some(pending) => pending.push(flag),
            None => self.record.flags.push(flag),
        }
    }

    fn check_alignment(&self) -> Result<(), DetectError> {
        let pending = self.episode.as_ref().map_or(0, Episode::pending_len);
        let flags = self.record.flags.len() + pending;
        let samples = self.record.derived.len();
        let confidence = self.record.confidence.len();
        if flags != samples || confidence != samples || self.record.times.len() != samples {
            tracing::error!(flags, samples, confidence, "detection history misaligned");
            return Err(DetectError::Misaligned {
                flags,
                samples,
                confidence,
            });
        }
        Ok(())
    }
}

/// Number of channels exceeding the background by more than `nsigma` sigma.
pub fn count_votes(flux: [f64; CHANNELS], stats: &BackgroundStats, nsigma: f64) -> u8 {
    (0..CHANNELS)
        .filter(|&ch| flux[ch] - stats.mean[ch] > nsigma * stats.std[ch])
        .count() as u8
}

fn derive(flux: [f64; CHANNELS], stats: &BackgroundStats) -> Derived {
    let mut signal = [0.0; CHANNELS];
    for ch in 0..CHANNELS {
        signal[ch] = flux[ch] - stats.mean[ch];
    }
    Derived {
        signal,
        mean: stats.mean,
        std: stats.std,
    }
}
