//! Observer lists for install downloads.

use crate::core::Status;
use std::fmt;
use std::path::PathBuf;

/// Snapshot of an install at the moment its download terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Qualified id of the installed package
    pub package_id: String,
    /// Install directory
    pub path: PathBuf,
    /// Terminal status
    pub status: Status,
    /// Installed revision after the download (unchanged on failure)
    pub revision: u32,
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Callback run once when a download terminates.
pub type OutcomeCallback = Box<dyn FnOnce(&InstallOutcome)>;

/// Callback run for every received chunk with `(downloaded, total)` bytes;
/// `total` is 0 when the server did not declare a length.
pub type ProgressCallback = Box<dyn FnMut(u64, u64)>;

/// Tracks whether the current download has terminated and who wants to know.
///
/// Subscribers registered after termination run immediately instead of
/// being queued. A `done` subscriber registered after a failure (or a `fail`
/// subscriber after a success) waits for the next download.
#[derive(Default)]
pub(crate) struct Completion {
    terminal: Option<InstallOutcome>,
    done: Vec<OutcomeCallback>,
    fail: Vec<OutcomeCallback>,
    always: Vec<OutcomeCallback>,
    progress: Vec<ProgressCallback>,
}

impl Completion {
    /// Starts already settled, for installs that exist on disk.
    pub(crate) fn settled(outcome: InstallOutcome) -> Self {
        Self {
            terminal: Some(outcome),
            ..Self::default()
        }
    }

    /// A new download started; later subscribers wait for it.
    pub(crate) fn reset(&mut self) {
        self.terminal = None;
    }

    pub(crate) fn on_done(&mut self, callback: OutcomeCallback) {
        match &self.terminal {
            Some(outcome) if outcome.is_success() => callback(outcome),
            _ => self.done.push(callback),
        }
    }

    pub(crate) fn on_fail(&mut self, callback: OutcomeCallback) {
        match &self.terminal {
            Some(outcome) if !outcome.is_success() => callback(outcome),
            _ => self.fail.push(callback),
        }
    }

    pub(crate) fn on_always(&mut self, callback: OutcomeCallback) {
        match &self.terminal {
            Some(outcome) => callback(outcome),
            None => self.always.push(callback),
        }
    }

    pub(crate) fn on_progress(&mut self, callback: ProgressCallback) {
        self.progress.push(callback);
    }

    pub(crate) fn progress(&mut self, downloaded: u64, total: u64) {
        for callback in &mut self.progress {
            callback(downloaded, total);
        }
    }

    /// Records the terminal outcome and runs the matching subscribers.
    pub(crate) fn settle(&mut self, outcome: InstallOutcome) {
        let matching = if outcome.is_success() {
            std::mem::take(&mut self.done)
        } else {
            std::mem::take(&mut self.fail)
        };
        for callback in matching {
            callback(&outcome);
        }
        for callback in std::mem::take(&mut self.always) {
            callback(&outcome);
        }
        self.progress.clear();
        self.terminal = Some(outcome);
    }

    pub(crate) fn outcome(&self) -> Option<&InstallOutcome> {
        self.terminal.as_ref()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("terminal", &self.terminal)
            .field("done", &self.done.len())
            .field("fail", &self.fail.len())
            .field("always", &self.always.len())
            .field("progress", &self.progress.len())
            .finish()
    }
}
