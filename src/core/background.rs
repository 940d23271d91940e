//! Rolling background estimate over recent quiet samples.
//!
//! The window is a fixed-capacity ring buffer written through a head cursor.
//! Running sums give O(1) mean and standard deviation; they are recomputed
//! exactly every time the cursor wraps so rounding error cannot accumulate.

use crate::source::types::CHANNELS;

/// Mean and population standard deviation of each channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundStats {
    pub mean: [f64; CHANNELS],
    pub std: [f64; CHANNELS],
}

/// Fixed-capacity FIFO of background readings.
#[derive(Debug, Clone)]
pub struct BackgroundWindow {
    slots: Box<[[f64; CHANNELS]]>,
    /// Next slot to write; also the oldest entry once the window is full
    head: usize,
    len: usize,
    sum: [f64; CHANNELS],
    sum_sq: [f64; CHANNELS],
}

impl BackgroundWindow {
    /// Create an empty window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![[0.0; CHANNELS]; capacity.max(1)].into_boxed_slice(),
            head: 0,
            len: 0,
            sum: [0.0; CHANNELS],
            sum_sq: [0.0; CHANNELS],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether warm-up is over.
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Admit a reading, evicting the oldest one when the window is full.
    pub fn push(&mut self, reading: [f64; CHANNELS]) -> Option<[f64; CHANNELS]> {
        let evicted = if self.is_full() {
            Some(self.slots[self.head])
        } else {
            None
        };

        if let Some(old) = evicted {
            for ch in 0..CHANNELS {
                self.sum[ch] -= old[ch];
                self.sum_sq[ch] -= old[ch] * old[ch];
            }
        } else {
            self.len += 1;
        }

        self.slots[self.head] = reading;
        for ch in 0..CHANNELS {
            self.sum[ch] += reading[ch];
            self.sum_sq[ch] += reading[ch] * reading[ch];
        }

        self.head = (self.head + 1) % self.capacity();
        if self.head == 0 {
            self.resum();
        }

        evicted
    }

    /// Replace the whole window with the given readings (oldest first).
    ///
    /// Only the most recent `capacity` readings are kept.
    pub fn replace_with(&mut self, readings: &[[f64; CHANNELS]]) {
        self.head = 0;
        self.len = 0;
        self.sum = [0.0; CHANNELS];
        self.sum_sq = [0.0; CHANNELS];

        let skip = readings.len().saturating_sub(self.capacity());
        for &reading in &readings[skip..] {
            self.push(reading);
        }
        self.resum();
    }

    /// Iterate over the readings from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &[f64; CHANNELS]> + '_ {
        let start = if self.is_full() { self.head } else { 0 };
        (0..self.len).map(move |i| &self.slots[(start + i) % self.capacity()])
    }

    /// Per-channel mean and population standard deviation.
    ///
    /// An empty window yields NaN statistics.
    pub fn stats(&self) -> BackgroundStats {
        let n = self.len as f64;
        let mut mean = [f64::NAN; CHANNELS];
        let mut std = [f64::NAN; CHANNELS];
        if self.len > 0 {
            for ch in 0..CHANNELS {
                mean[ch] = self.sum[ch] / n;
                let variance = self.sum_sq[ch] / n - mean[ch] * mean[ch];
                std[ch] = variance.max(0.0).sqrt();
            }
        }
        BackgroundStats { mean, std }
    }

    fn resum(&mut self) {
        let mut sum = [0.0; CHANNELS];
        let mut sum_sq = [0.0; CHANNELS];
        for reading in self.iter() {
            for ch in 0..CHANNELS {
                sum[ch] += reading[ch];
                sum_sq[ch] += reading[ch] * reading[ch];
            }
        }
        self.sum = sum;
        self.sum_sq = sum_sq;
    }
}
