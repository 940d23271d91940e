//! Flaremon - solar radio flare detection on total-power scan data.
//!
//! This library watches the three-band total-power time series recorded
//! during solar observing scans and flags the stretches where the Sun flares.
//! Each sample is compared with a rolling background; a confidence counter
//! debounces the decision, and every candidate episode is checked for being a
//! mere receiver level change before it is accepted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Flaremon                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Source    │──▶│  Detector   │──▶│  Segments   │        │
//! │  │ (file/tail) │   │ (fast/slow) │   │  (refine)   │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Ingest    │   │ Flare list  │◀──│   Grading   │        │
//! │  │    Stats    │   │  (report)   │   │ (severity)  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use flaremon::{config::Config, core::DualPipeline, source::ScanFile};
//!
//! let config = Config::default();
//! let mut pipeline = DualPipeline::new(config.fast_detector(), config.slow_detector());
//!
//! let scan = ScanFile::read("TP20240514183000.dat").expect("Failed to read scan");
//! if scan.is_solar() {
//!     pipeline.feed(&scan.lines).expect("Detection failed");
//! }
//!
//! for flare in &pipeline.fast.record().flares {
//!     println!("{} {:?}", flare.flare_id(), flare.severities());
//! }
//! ```

pub mod config;
pub mod core;
pub mod report;
pub mod source;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, DetectorConfig, OpenFlarePolicy};
pub use core::{DetectError, DetectionRecord, Detector, DualPipeline, FeedSummary, FlareRecord};
pub use report::{write_flare_list, ReportError, TriggerView, FLARE_LIST_HEADER};
pub use source::{FileTail, Sample, ScanFile, ScanLine, SourceError, TailEvent};
pub use stats::{IngestLog, IngestStats, SharedIngestLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
