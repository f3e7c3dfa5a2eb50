//! Installed (or installing) packages.
//!
//! An [`Install`] is identified by its directory and records which revision
//! of its package is on disk. Revision 0 means the content has never been
//! published there: the package was only marked for install, or its first
//! download is still running.
//!
//! Downloads are performed by the [`Registry`](crate::registry::Registry);
//! the install exposes their progress and lets callers subscribe to the
//! outcome.

pub mod completion;
pub(crate) mod download;
pub mod extract;

pub use completion::{InstallOutcome, OutcomeCallback, ProgressCallback};
pub use extract::ArchiveExtractor;

use crate::catalog::Package;
use crate::constants::REVISION_FILE;
use crate::core::Status;
use crate::utils::fs::read_int_file;
use completion::Completion;
use download::Download;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One package directory managed by the registry.
#[derive(Debug)]
pub struct Install {
    path: PathBuf,
    catalog_id: String,
    package_id: String,
    revision: u32,
    status: Status,
    pub(crate) download: Option<Download>,
    pub(crate) completion: Completion,
}

impl Install {
    pub(crate) fn new(path: PathBuf, package: &Package, revision: u32) -> Self {
        let mut install = Self {
            path,
            catalog_id: package.catalog_id().to_string(),
            package_id: package.id().to_string(),
            revision,
            status: Status::Success,
            download: None,
            completion: Completion::default(),
        };
        if revision > 0 {
            install.completion = Completion::settled(install.outcome());
        }
        install
    }

    /// Registers an existing directory, reading its revision file.
    pub(crate) fn from_disk(path: PathBuf, package: &Package) -> Self {
        let revision_file = path.join(REVISION_FILE);
        let revision = match read_int_file(&revision_file) {
            Ok(value) => value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
            Err(e) => {
                warn!("Treating {} as not installed: {e:#}", path.display());
                0
            }
        };
        Self::new(path, package, revision)
    }

    /// Install directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id of the catalog the package came from.
    pub fn catalog_id(&self) -> &str {
        &self.catalog_id
    }

    /// Bare package id.
    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// `catalogId.packageId`
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.catalog_id, self.package_id)
    }

    /// Revision on disk; 0 if the content was never published.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Status of the latest download.
    ///
    /// Before the first download has terminated this is `Success` whatever
    /// the revision, so a marked install with nothing on disk also reports
    /// `Success`. Use [`is_installed`](Self::is_installed) to ask whether
    /// content is present.
    pub fn status(&self) -> Status {
        self.status
    }

    /// True once some revision of the content is on disk.
    pub fn is_installed(&self) -> bool {
        self.revision > 0
    }

    pub fn is_downloading(&self) -> bool {
        self.download.is_some()
    }

    /// True if `package` offers a newer revision than the one on disk.
    pub fn has_update(&self, package: &Package) -> bool {
        package.revision() > self.revision
    }

    /// Bytes received by the current download.
    pub fn downloaded_bytes(&self) -> u64 {
        self.download.as_ref().map_or(0, Download::downloaded)
    }

    /// Declared length of the current response, if known.
    pub fn response_length(&self) -> Option<u64> {
        self.download.as_ref().and_then(Download::content_length)
    }

    /// Progress of the current download in percent; 0 while the length is unknown.
    pub fn downloaded_percent(&self) -> u32 {
        match self.response_length() {
            Some(total) if total > 0 => {
                let percent = self.downloaded_bytes().saturating_mul(100) / total;
                u32::try_from(percent.min(100)).unwrap_or(100)
            }
            _ => 0,
        }
    }

    /// URL the current attempt downloads from.
    pub fn download_url(&self) -> Option<&str> {
        self.download.as_ref().map(Download::url)
    }

    /// Total size of the files in the install directory.
    pub fn disk_usage(&self) -> u64 {
        WalkDir::new(&self.path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Runs `callback` when a download succeeds, or right away if the last
    /// one already did.
    pub fn on_done(&mut self, callback: impl FnOnce(&InstallOutcome) + 'static) {
        self.completion.on_done(Box::new(callback));
    }

    /// Runs `callback` when a download fails or is cancelled.
    pub fn on_fail(&mut self, callback: impl FnOnce(&InstallOutcome) + 'static) {
        self.completion.on_fail(Box::new(callback));
    }

    /// Runs `callback` when a download terminates either way.
    pub fn on_always(&mut self, callback: impl FnOnce(&InstallOutcome) + 'static) {
        self.completion.on_always(Box::new(callback));
    }

    /// Runs `callback` for every received chunk of the current download.
    pub fn on_progress(&mut self, callback: impl FnMut(u64, u64) + 'static) {
        self.completion.on_progress(Box::new(callback));
    }

    /// Current state as an outcome record.
    ///
    /// Subject to the same caveat as [`status`](Self::status): check
    /// `revision` before treating `Success` as content on disk.
    pub fn outcome(&self) -> InstallOutcome {
        InstallOutcome {
            package_id: self.qualified_id(),
            path: self.path.clone(),
            status: self.status,
            revision: self.revision,
        }
    }

    pub(crate) fn begin_download(&mut self, download: Download) {
        self.download = Some(download);
        self.status = Status::InProgress;
        self.completion.reset();
    }

    /// Terminates the current download and notifies subscribers.
    pub(crate) fn settle(&mut self, status: Status, revision: Option<u32>) -> InstallOutcome {
        self.download = None;
        self.status = status;
        if let Some(revision) = revision {
            self.revision = revision;
        }
        let outcome = self.outcome();
        self.completion.settle(outcome.clone());
        outcome
    }
}
