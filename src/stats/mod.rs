//! Ingest statistics for the flare monitor.
//!
//! Keeps a running account of what was read, skipped and reported so that an
//! operator can tell a quiet Sun from a broken feed.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_log_with_persistence, IngestLog, IngestStats, SharedIngestLog};
