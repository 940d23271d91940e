//! Ingest statistics log.
//!
//! Counts what the monitor consumed and produced. The counters are atomic so
//! the log can be shared between the tail thread and the processing loop,
//! and they are persisted across runs.

use crate::core::pipeline::FeedSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ingest counters for the current run.
#[derive(Debug)]
pub struct IngestLog {
    /// Data lines turned into samples
    lines_accepted: AtomicU64,
    /// Data lines that could not be parsed
    lines_malformed: AtomicU64,
    /// Samples with a zero reading
    samples_missing: AtomicU64,
    /// Scans skipped because they were not solar observations
    scans_skipped: AtomicU64,
    /// Flare list files written
    reports_written: AtomicU64,
    /// Run start time
    run_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl IngestLog {
    /// Create a new ingest log.
    pub fn new() -> Self {
        Self {
            lines_accepted: AtomicU64::new(0),
            lines_malformed: AtomicU64::new(0),
            samples_missing: AtomicU64::new(0),
            scans_skipped: AtomicU64::new(0),
            reports_written: AtomicU64::new(0),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an ingest log that continues from persisted counters.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("could not load previous ingest stats: {e}");
        }

        log
    }

    /// Record the outcome of feeding one batch of lines.
    pub fn record_feed(&self, summary: &FeedSummary) {
        self.lines_accepted
            .fetch_add(summary.accepted as u64, Ordering::Relaxed);
        self.lines_malformed.fetch_add(
            (summary.malformed + summary.out_of_order) as u64,
            Ordering::Relaxed,
        );
        self.samples_missing
            .fetch_add(summary.missing as u64, Ordering::Relaxed);
    }

    /// Record a skipped non-solar scan.
    pub fn record_scan_skipped(&self) {
        self.scans_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a written flare list.
    pub fn record_report_written(&self) {
        self.reports_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            lines_accepted: self.lines_accepted.load(Ordering::Relaxed),
            lines_malformed: self.lines_malformed.load(Ordering::Relaxed),
            samples_missing: self.samples_missing.load(Ordering::Relaxed),
            scans_skipped: self.scans_skipped.load(Ordering::Relaxed),
            reports_written: self.reports_written.load(Ordering::Relaxed),
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Ingest Statistics:\n\
             - Lines accepted: {}\n\
             - Lines skipped: {}\n\
             - Missing samples: {}\n\
             - Non-solar scans skipped: {}\n\
             - Flare lists written: {}\n\
             - Run duration: {} seconds",
            stats.lines_accepted,
            stats.lines_malformed,
            stats.samples_missing,
            stats.scans_skipped,
            stats.reports_written,
            stats.run_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                lines_accepted: stats.lines_accepted,
                lines_malformed: stats.lines_malformed,
                samples_missing: stats.samples_missing,
                scans_skipped: stats.scans_skipped,
                reports_written: stats.reports_written,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.lines_accepted
                    .store(persisted.lines_accepted, Ordering::Relaxed);
                self.lines_malformed
                    .store(persisted.lines_malformed, Ordering::Relaxed);
                self.samples_missing
                    .store(persisted.samples_missing, Ordering::Relaxed);
                self.scans_skipped
                    .store(persisted.scans_skipped, Ordering::Relaxed);
                self.reports_written
                    .store(persisted.reports_written, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for IngestLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of ingest statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStats {
    pub lines_accepted: u64,
    pub lines_malformed: u64,
    pub samples_missing: u64,
    pub scans_skipped: u64,
    pub reports_written: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    lines_accepted: u64,
    lines_malformed: u64,
    samples_missing: u64,
    scans_skipped: u64,
    reports_written: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared ingest log.
pub type SharedIngestLog = Arc<IngestLog>;

/// Create a new shared ingest log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedIngestLog {
    Arc::new(IngestLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_log_counting() {
        let log = IngestLog::new();
        log.record_feed(&FeedSummary {
            accepted: 10,
            malformed: 2,
            missing: 1,
            out_of_order: 1,
        });
        log.record_scan_skipped();
        log.record_report_written();

        let stats = log.stats();
        assert_eq!(stats.lines_accepted, 10);
        assert_eq!(stats.lines_malformed, 3);
        assert_eq!(stats.samples_missing, 1);
        assert_eq!(stats.scans_skipped, 1);
        assert_eq!(stats.reports_written, 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.json");

        let log = IngestLog::with_persistence(path.clone());
        log.record_report_written();
        log.save().unwrap();

        let reloaded = create_shared_log_with_persistence(path);
        assert_eq!(reloaded.stats().reports_written, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = IngestLog::new().summary();
        assert!(summary.contains("Lines accepted"));
        assert!(summary.contains("Flare lists written"));
    }
}
