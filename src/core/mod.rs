//! Core flare detection.
//!
//! This module contains:
//! - The rolling background window
//! - Per-sample classification and the hysteresis state machine
//! - Segment refinement of the raw flag history
//! - Flare extraction and severity grading
//! - The dual fast/slow pipeline

pub mod background;
pub mod detector;
pub mod grading;
pub mod pipeline;
pub mod record;
pub mod segments;

// Re-export commonly used types
pub use background::{BackgroundStats, BackgroundWindow};
pub use detector::{count_votes, DetectError, Detector, FlareState};
pub use grading::{extract_flares, grade_channel, ChannelGrade, FlareRecord, NOISE_FLOOR};
pub use pipeline::{feed_detector, DualPipeline, FeedSummary};
pub use record::{DetectionRecord, Derived};
pub use segments::{refine, segments, Segment};
