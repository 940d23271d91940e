//! Post-processing of raw flag histories into clean in-flare intervals.

use serde::{Deserialize, Serialize};

/// A run of in-flare samples, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Index of the first in-flare sample
    pub start: usize,
    /// Index of the first sample after the run; `None` while still open
    pub end: Option<usize>,
}

impl Segment {
    /// Exclusive end, using `len` for an open segment.
    pub fn end_or(&self, len: usize) -> usize {
        self.end.unwrap_or(len)
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Find the runs of `true` values.
pub fn segments(on: &[bool]) -> Vec<Segment> {
    let mut found = Vec::new();
    let mut start = None;
    for (i, &value) in on.iter().enumerate() {
        match (value, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                found.push(Segment {
                    start: s,
                    end: Some(i),
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        found.push(Segment { start: s, end: None });
    }
    found
}

/// Turn a flag history into the clean in-flare sequence.
///
/// A flagged run survives only when the `nbgnd - nflare` samples from its
/// first sample on are all flagged; shorter blips left over by the
/// hysteresis are dropped. A single unflagged sample between two surviving
/// runs is then flagged as well, joining them.
pub fn refine(flags: &[u8], nflare: usize, nbgnd: usize) -> Vec<bool> {
    let on: Vec<bool> = flags.iter().map(|&f| f > 0).collect();
    let hold = nbgnd.saturating_sub(nflare);

    let mut clean = vec![false; on.len()];
    for segment in segments(&on) {
        let sustained = segment.start + hold <= on.len()
            && on[segment.start..segment.start + hold].iter().all(|&v| v);
        if sustained {
            let end = segment.end_or(on.len());
            clean[segment.start..end].iter_mut().for_each(|v| *v = true);
        }
    }

    let kept = segments(&clean);
    for pair in kept.windows(2) {
        if let Some(end) = pair[0].end {
            if pair[1].start == end + 1 {
                clean[end] = true;
            }
        }
    }

    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(pattern: &str) -> Vec<u8> {
        pattern.bytes().map(|b| if b == b'1' { 2 } else { 0 }).collect()
    }

    fn render(clean: &[bool]) -> String {
        clean.iter().map(|&v| if v { '1' } else { '0' }).collect()
    }

    #[test]
    fn test_segments() {
        let on = [false, true, true, false, true];
        assert_eq!(
            segments(&on),
            vec![
                Segment {
                    start: 1,
                    end: Some(3)
                },
                Segment {
                    start: 4,
                    end: None
                },
            ]
        );
        assert!(segments(&[]).is_empty());
    }

    #[test]
    fn test_short_runs_dropped() {
        // hold = 3
        let clean = refine(&flags("0110001111000"), 2, 5);
        assert_eq!(render(&clean), "0000001111000");
    }

    #[test]
    fn test_open_run_needs_full_hold() {
        let clean = refine(&flags("000011"), 2, 5);
        assert_eq!(render(&clean), "000000");
        let clean = refine(&flags("0000111"), 2, 5);
        assert_eq!(render(&clean), "0000111");
    }

    #[test]
    fn test_single_gap_closed() {
        let clean = refine(&flags("0111011100"), 1, 4);
        assert_eq!(render(&clean), "0111111100");
    }

    #[test]
    fn test_wider_gap_kept() {
        let clean = refine(&flags("01110011100"), 1, 4);
        assert_eq!(render(&clean), "01110011100");
    }

    #[test]
    fn test_gap_next_to_dropped_blip_stays_open() {
        // The second run is too short to survive, so nothing is merged.
        let clean = refine(&flags("0111010"), 1, 4);
        assert_eq!(render(&clean), "0111000");
    }

    #[test]
    fn test_empty_and_single_sample() {
        assert!(refine(&[], 10, 50).is_empty());
        assert_eq!(refine(&[0], 10, 50), vec![false]);
    }
}
