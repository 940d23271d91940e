//! Daily flare list output.
//!
//! The list is a fixed-width text file, one row per flare, regenerated in
//! full on every update so that the same detection record always produces
//! the same bytes.

use crate::config::OpenFlarePolicy;
use crate::core::grading::FlareRecord;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column header of the flare list.
pub const FLARE_LIST_HEADER: &str = "____FlareID____  _____Start UTC_____  _____Peak UTC______  ______End UTC______  __Imp:_03-07__07-13__13-18__";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Width of a formatted timestamp column.
const TIME_WIDTH: usize = 19;

/// Errors raised while writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize flares: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn format_time(time: NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Format one flare as a flare list row.
pub fn format_row(flare: &FlareRecord) -> String {
    let end = flare
        .end
        .map(format_time)
        .unwrap_or_else(|| " ".repeat(TIME_WIDTH));
    let [s0, s1, s2] = flare.severities();
    format!(
        "{}  {}  {}  {}           {}      {}      {}",
        flare.flare_id(),
        format_time(flare.start),
        format_time(flare.peak),
        end,
        s0,
        s1,
        s2
    )
}

/// Render the complete flare list.
pub fn render_flare_list(flares: &[FlareRecord], policy: OpenFlarePolicy) -> String {
    let mut text = String::from(FLARE_LIST_HEADER);
    text.push('\n');
    for flare in flares {
        if policy == OpenFlarePolicy::Defer && flare.is_in_progress() {
            continue;
        }
        text.push_str(&format_row(flare));
        text.push('\n');
    }
    text
}

/// Which detector instance a flare list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerView {
    /// Short background window
    Fast,
    /// Long background window
    Stable,
}

/// Path of the flare list for an observing day.
pub fn flare_list_path(dir: &Path, day: NaiveDate, view: TriggerView) -> PathBuf {
    let suffix = match view {
        TriggerView::Fast => "",
        TriggerView::Stable => "_stable",
    };
    dir.join(format!("flarelist_{}{suffix}.txt", day.format("%Y-%m-%d")))
}

/// Write the flare list of an observing day, replacing any previous version.
pub fn write_flare_list(
    dir: &Path,
    day: NaiveDate,
    view: TriggerView,
    flares: &[FlareRecord],
    policy: OpenFlarePolicy,
) -> Result<PathBuf, ReportError> {
    let path = flare_list_path(dir, day, view);
    let io_err = |source| ReportError::Io {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(io_err)?;
    std::fs::write(&path, render_flare_list(flares, policy)).map_err(io_err)?;

    tracing::info!(path = %path.display(), ?view, flares = flares.len(), "flare list written");
    Ok(path)
}

/// Export the flare records as pretty JSON.
pub fn export_json(path: &Path, flares: &[FlareRecord]) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(flares)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
