//! Live line source that follows a growing scan file.
//!
//! A background thread polls the file on a fixed interval and forwards the
//! newly appended, fully written lines over a channel. A trailing line
//! without its newline is left unconsumed and re-read on the next poll.

use crate::source::file::{
    is_solar_project, project_tag, ScanLine, SourceError, HEADER_LINES, PROJECT_LINE,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Granularity at which the poll thread checks for a stop request.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Something the tail observed in the followed file.
#[derive(Debug, Clone, PartialEq)]
pub enum TailEvent {
    /// Newly completed data lines, in file order
    Lines(Vec<ScanLine>),
    /// The scan header names a non-solar project; no data will follow
    NonSolar(Option<String>),
}

/// Errors that can occur while controlling the tail.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("tail is already running")]
    AlreadyRunning,
    #[error("failed to spawn tail thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Incremental reader over a growing scan file.
#[derive(Debug)]
pub struct TailReader {
    path: PathBuf,
    /// Bytes consumed so far (always at a line boundary)
    offset: u64,
    /// Number of complete lines consumed so far
    line_number: usize,
    project: Option<String>,
    finished: bool,
}

impl TailReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            line_number: 0,
            project: None,
            finished: false,
        }
    }

    /// Whether the reader has stopped producing data (non-solar scan).
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read whatever complete lines were appended since the last poll.
    pub fn poll(&mut self) -> Result<Option<TailEvent>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        let io_err = |source| SourceError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = std::fs::File::open(&self.path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        if len < self.offset {
            tracing::warn!(path = %self.path.display(), "scan file shrank, restarting from the top");
            self.offset = 0;
            self.line_number = 0;
            self.project = None;
        }

        file.seek(SeekFrom::Start(self.offset)).map_err(io_err)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(io_err)?;

        let complete = match buf.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None => return Ok(None),
        };
        self.offset += complete as u64;

        let text = String::from_utf8_lossy(&buf[..complete]);
        let mut lines = Vec::new();
        for line in text.lines() {
            self.line_number += 1;
            if self.line_number == PROJECT_LINE {
                self.project = project_tag(line);
                if !is_solar_project(self.project.as_deref()) {
                    self.finished = true;
                    return Ok(Some(TailEvent::NonSolar(self.project.clone())));
                }
            }
            if self.line_number > HEADER_LINES {
                lines.push(ScanLine::new(self.line_number - HEADER_LINES, line));
            }
        }

        if lines.is_empty() {
            Ok(None)
        } else {
            Ok(Some(TailEvent::Lines(lines)))
        }
    }
}

/// Follows a scan file from a background thread.
pub struct FileTail {
    path: PathBuf,
    poll_interval: Duration,
    sender: Sender<TailEvent>,
    receiver: Receiver<TailEvent>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FileTail {
    /// Create a new tail for the given file.
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        let (sender, receiver) = bounded(1_024);
        Self {
            path: path.into(),
            poll_interval,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start polling the file.
    pub fn start(&mut self) -> Result<(), TailError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(TailError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let mut reader = TailReader::new(self.path.clone());
        let sender = self.sender.clone();
        let running = self.running.clone();
        let interval = self.poll_interval;

        let handle = thread::Builder::new()
            .name("flaremon-tail".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match reader.poll() {
                        Ok(Some(event)) => {
                            if sender.send(event).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("tail poll failed: {e}"),
                    }
                    if reader.is_finished() {
                        break;
                    }

                    let started = Instant::now();
                    while running.load(Ordering::SeqCst) && started.elapsed() < interval {
                        thread::sleep(STOP_CHECK_INTERVAL.min(interval));
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                TailError::Spawn(e)
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop polling and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("tail thread panicked");
            }
        }
    }

    /// Check if the poll thread is still active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for tail events.
    pub fn receiver(&self) -> &Receiver<TailEvent> {
        &self.receiver
    }
}

impl Drop for FileTail {
    fn drop(&mut self) {
        self.stop();
    }
}
