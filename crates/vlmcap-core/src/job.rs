//! Directory job tracking.
//!
//! A [`DirectoryJob`] records per-file status for one batch run. The
//! [`JobTracker`] holds the single job the outside world can observe; the
//! background worker keeps its own handle to the job it is processing, so a
//! stopped job can still be written to but is no longer visible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::{CaptionError, Result};

/// Status of one file in a directory job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileState {
    Pending,
    Processing,
    Success,
    Error,
}

impl FileState {
    /// Success and Error are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Success | FileState::Error)
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileState::Pending => write!(f, "Pending"),
            FileState::Processing => write!(f, "Processing"),
            FileState::Success => write!(f, "Success"),
            FileState::Error => write!(f, "Error"),
        }
    }
}

/// Status record for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub file: String,
    pub state: FileState,
    /// Caption on success, failure message on error, empty otherwise
    pub message: String,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub total_files: usize,
    /// Files that have left Pending
    pub processed_files: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// One entry per file, in processing order
    pub files: Vec<FileStatus>,
}

impl JobProgress {
    pub fn is_complete(&self) -> bool {
        self.processed_files == self.total_files
    }

    /// Status of one file.
    pub fn status(&self, file: &str) -> Option<&FileStatus> {
        self.files.iter().find(|s| s.file == file)
    }
}

struct JobState {
    statuses: HashMap<String, (FileState, String)>,
    processed: usize,
    succeeded: usize,
    failed: usize,
}

/// One batch-captioning run.
///
/// Counters only move forward: `processed` counts files that left Pending,
/// `succeeded`/`failed` count files that reached a terminal state. Once a
/// file is terminal, further updates to it are ignored, so
/// `succeeded + failed <= processed <= total` always holds.
pub struct DirectoryJob {
    files: Vec<String>,
    state: Mutex<JobState>,
    cancelled: AtomicBool,
}

impl DirectoryJob {
    /// Create a job with every file Pending.
    ///
    /// Repeated names are tracked once, at their first position, so the
    /// job can always complete.
    pub fn new(files: Vec<String>) -> Self {
        let requested = files.len();
        let mut statuses = HashMap::with_capacity(requested);
        let files: Vec<String> = files
            .into_iter()
            .filter(|f| {
                statuses
                    .insert(f.clone(), (FileState::Pending, String::new()))
                    .is_none()
            })
            .collect();
        if files.len() < requested {
            tracing::warn!(
                "Dropped {} duplicate file names from directory job",
                requested - files.len()
            );
        }
        Self {
            files,
            state: Mutex::new(JobState {
                statuses,
                processed: 0,
                succeeded: 0,
                failed: 0,
            }),
            cancelled: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        // Counters are updated atomically under the lock, so a poisoned
        // state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    /// File names in processing order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Move `file` to `state`.
    ///
    /// Returns `Ok(false)` when the update was ignored (file already
    /// terminal, or an attempt to go back to Pending).
    pub fn update(&self, file: &str, state: FileState, message: impl Into<String>) -> Result<bool> {
        let mut job = self.lock();
        let (current, _) = job
            .statuses
            .get(file)
            .cloned()
            .ok_or_else(|| CaptionError::UnknownJobFile(file.to_string()))?;

        if current.is_terminal() {
            tracing::debug!("Ignoring {state} update for {file}: already {current}");
            return Ok(false);
        }
        if state == FileState::Pending {
            if current != FileState::Pending {
                tracing::debug!("Ignoring Pending update for {file}: already {current}");
                return Ok(false);
            }
            return Ok(true);
        }

        if current == FileState::Pending {
            job.processed += 1;
        }
        match state {
            FileState::Success => job.succeeded += 1,
            FileState::Error => job.failed += 1,
            _ => {}
        }
        job.statuses
            .insert(file.to_string(), (state, message.into()));
        Ok(true)
    }

    pub fn progress(&self) -> JobProgress {
        let job = self.lock();
        let files = self
            .files
            .iter()
            .map(|f| {
                let (state, message) = job
                    .statuses
                    .get(f)
                    .cloned()
                    .unwrap_or((FileState::Pending, String::new()));
                FileStatus {
                    file: f.clone(),
                    state,
                    message,
                }
            })
            .collect();

        JobProgress {
            total_files: self.files.len(),
            processed_files: job.processed,
            success_count: job.succeeded,
            error_count: job.failed,
            files,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.lock().processed >= self.files.len()
    }

    /// Ask the worker to stop before its next file.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Holds the one observable directory job.
#[derive(Default)]
pub struct JobTracker {
    current: Mutex<Option<Arc<DirectoryJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<DirectoryJob>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track a new job over `files`.
    ///
    /// Fails with `JobAlreadyInProgress` while the tracked job is incomplete.
    /// A completed job is replaced.
    pub fn create(&self, files: Vec<String>) -> Result<Arc<DirectoryJob>> {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|job| !job.is_complete()) {
            return Err(CaptionError::JobAlreadyInProgress);
        }
        let job = Arc::new(DirectoryJob::new(files));
        *slot = Some(job.clone());
        Ok(job)
    }

    /// Update a file of the tracked job.
    pub fn update(&self, file: &str, state: FileState, message: impl Into<String>) -> Result<bool> {
        let job = self.current().ok_or(CaptionError::NoJobInProgress)?;
        job.update(file, state, message)
    }

    /// Progress of the tracked job.
    pub fn progress(&self) -> Result<JobProgress> {
        self.current()
            .map(|job| job.progress())
            .ok_or(CaptionError::NoJobInProgress)
    }

    /// The tracked job, if any.
    pub fn current(&self) -> Option<Arc<DirectoryJob>> {
        self.slot().clone()
    }

    /// Detach the tracked job and signal its worker to stop.
    ///
    /// The file being captioned when this is called still finishes (and its
    /// sidecar is still written), but its status update is no longer
    /// observable. Returns whether a job was tracked.
    pub fn stop(&self) -> bool {
        match self.slot().take() {
            Some(job) => {
                job.cancel();
                true
            }
            None => false,
        }
    }
}
