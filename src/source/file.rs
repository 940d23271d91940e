//! Flaretest scan files.
//!
//! Each scan file starts with a fixed-size header. The second header line
//! names the observing project; only solar scans carry flare data.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of header lines preceding the data lines.
pub const HEADER_LINES: usize = 8;

/// Header line (1-based) carrying the project tag.
pub const PROJECT_LINE: usize = 2;

/// Project tag of regular solar observing scans.
pub const SOLAR_PROJECT: &str = "NormalObserving";

/// Errors raised while reading a line source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A data line together with its 1-based position after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLine {
    pub position: usize,
    pub text: String,
}

impl ScanLine {
    pub fn new(position: usize, text: impl Into<String>) -> Self {
        Self {
            position,
            text: text.into(),
        }
    }
}

/// Extract the project tag from the project header line.
pub fn project_tag(header_line: &str) -> Option<String> {
    header_line
        .split_whitespace()
        .nth(1)
        .map(|tag| tag.replace('\0', ""))
}

/// Whether a project tag denotes a solar scan.
pub fn is_solar_project(tag: Option<&str>) -> bool {
    tag == Some(SOLAR_PROJECT)
}

/// A scan file split into header information and data lines.
#[derive(Debug, Clone)]
pub struct ScanFile {
    pub path: PathBuf,
    /// Project tag from the header, if the header was long enough
    pub project: Option<String>,
    /// Data lines following the header
    pub lines: Vec<ScanLine>,
}

impl ScanFile {
    /// Read a scan file from disk.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_text(path, &content))
    }

    /// Split already loaded file content.
    pub fn from_text(path: impl Into<PathBuf>, content: &str) -> Self {
        let mut project = None;
        let mut lines = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let number = idx + 1;
            if number == PROJECT_LINE {
                project = project_tag(line);
            }
            if number > HEADER_LINES {
                lines.push(ScanLine::new(number - HEADER_LINES, line));
            }
        }

        Self {
            path: path.into(),
            project,
            lines,
        }
    }

    /// Whether the scan is a solar observation that should be analysed.
    pub fn is_solar(&self) -> bool {
        is_solar_project(self.project.as_deref())
    }
}
