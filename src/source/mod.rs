//! Line sources for the flare monitor.
//!
//! Scan files are produced by the observing system one per scan. This module
//! turns them into [`Sample`]s, either all at once (batch) or by following a
//! file while it grows (live).

pub mod file;
pub mod tail;
pub mod types;

// Re-export commonly used types
pub use file::{ScanFile, ScanLine, SourceError, HEADER_LINES, SOLAR_PROJECT};
pub use tail::{FileTail, TailError, TailEvent, TailReader};
pub use types::{observing_day, parse_timestamp, Sample, SampleError, CHANNELS};
