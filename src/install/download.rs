//! One install download: mirror selection, hashing, extraction, publishing.
//!
//! The registry feeds transport events into a [`Download`] and decides what
//! to do with the resulting [`Status`]. Every attempt stages its content in
//! `<catalog dir>/_extract_<md5>`; nothing touches the install directory
//! until [`Download::publish`].

use super::extract::ArchiveExtractor;
use crate::constants::{BACKUP_PREFIX, REVISION_FILE, STAGING_PREFIX};
use crate::core::Status;
use crate::transport::RequestId;
use crate::utils::fs::{remove_dir_all, remove_dir_all_best_effort, write_int_file};
use md5::{Digest, Md5};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything needed to download one revision of a package.
#[derive(Debug, Clone)]
pub(crate) struct DownloadPlan {
    pub(crate) mirrors: Vec<String>,
    pub(crate) md5: String,
    pub(crate) content_root: String,
    pub(crate) revision: u32,
    pub(crate) target: PathBuf,
}

/// In-flight download of an install.
pub(crate) struct Download {
    remaining: Vec<String>,
    md5: String,
    content_root: String,
    revision: u32,
    target: PathBuf,
    staging: PathBuf,
    pub(crate) request: RequestId,
    url: String,
    attempts: u32,
    status_code: Option<u16>,
    content_length: Option<u64>,
    downloaded: u64,
    hasher: Option<Md5>,
    extractor: Option<ArchiveExtractor>,
    extract_error: Option<String>,
}

impl Download {
    pub(crate) fn new(plan: DownloadPlan) -> Self {
        let staging = Self::staging_dir(&plan.target, &plan.md5);
        Self {
            remaining: plan.mirrors,
            md5: plan.md5,
            content_root: plan.content_root,
            revision: plan.revision,
            target: plan.target,
            staging,
            request: RequestId(0),
            url: String::new(),
            attempts: 0,
            status_code: None,
            content_length: None,
            downloaded: 0,
            hasher: None,
            extractor: None,
            extract_error: None,
        }
    }

    /// Staging directory used for an archive with checksum `md5` installed to `target`.
    pub(crate) fn staging_dir(target: &Path, md5: &str) -> PathBuf {
        let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
        parent.join(format!("{STAGING_PREFIX}{}", md5.to_ascii_lowercase()))
    }

    /// Removes a random mirror from the candidates and returns it.
    pub(crate) fn pick_mirror<R: Rng>(&mut self, rng: &mut R) -> Option<String> {
        if self.remaining.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.remaining.len());
        Some(self.remaining.remove(index))
    }

    pub(crate) fn has_mirrors_left(&self) -> bool {
        !self.remaining.is_empty()
    }

    /// Resets per-attempt state and prepares a clean staging directory.
    pub(crate) fn begin_attempt(&mut self, request: RequestId, url: String) -> std::io::Result<()> {
        self.request = request;
        self.url = url;
        self.attempts += 1;
        self.status_code = None;
        self.content_length = None;
        self.downloaded = 0;
        self.hasher = None;
        self.extractor = None;
        self.extract_error = None;

        if self.staging.exists() {
            debug!("Removing stale staging directory {}", self.staging.display());
            fs::remove_dir_all(&self.staging)?;
        }
        fs::create_dir_all(&self.staging)
    }

    pub(crate) fn on_headers(&mut self, status: u16, content_length: Option<u64>) {
        self.status_code = Some(status);
        self.content_length = content_length;
        if status == 200 {
            self.hasher = Some(Md5::new());
            self.extractor = Some(ArchiveExtractor::new(&self.staging));
        }
    }

    /// Hashes the chunk, then hands it to the extractor unless extraction
    /// has already failed.
    pub(crate) fn on_body(&mut self, data: &[u8]) {
        self.downloaded += data.len() as u64;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(data);
        }
        if self.extract_error.is_some() {
            return;
        }
        if let Some(extractor) = &mut self.extractor {
            if let Err(e) = extractor.write(data) {
                warn!("Extraction from {} failed: {e:#}", self.url);
                self.extract_error = Some(format!("{e:#}"));
            }
        }
    }

    /// Checks the completed response and returns the staged content root.
    pub(crate) fn finish(&mut self) -> Result<PathBuf, Status> {
        match self.status_code {
            Some(200) => {}
            Some(404) => {
                debug!("{} answered 404", self.url);
                return Err(Status::FailNotFound);
            }
            code => {
                debug!("{} answered {code:?}", self.url);
                return Err(Status::FailDownload);
            }
        }

        let digest = self.hasher.take().map(|h| hex::encode(h.finalize())).unwrap_or_default();
        if !digest.eq_ignore_ascii_case(&self.md5) {
            warn!("Checksum mismatch for {}: expected {}, got {digest}", self.url, self.md5);
            return Err(Status::FailChecksum);
        }

        if let Some(reason) = &self.extract_error {
            debug!("Extraction had already failed: {reason}");
            return Err(Status::FailExtract);
        }
        let extractor = self.extractor.take().ok_or(Status::FailExtract)?;
        if let Err(e) = extractor.finish() {
            warn!("Archive from {} is incomplete: {e:#}", self.url);
            return Err(Status::FailExtract);
        }

        let root = self.staging.join(&self.content_root);
        if !root.is_dir() {
            warn!("Archive from {} has no '{}' directory", self.url, self.content_root);
            return Err(Status::FailExtract);
        }
        Ok(root)
    }

    /// Moves the staged content root into the install directory.
    ///
    /// The revision file is written into the staged tree first, so the
    /// install directory is complete as soon as it appears. An existing
    /// install is kept as a backup until the rename has succeeded.
    pub(crate) fn publish(&self, root: &Path) -> Result<(), Status> {
        self.publish_with(root, |from, to| fs::rename(from, to))
    }

    fn publish_with<F>(&self, root: &Path, mut rename: F) -> Result<(), Status>
    where
        F: FnMut(&Path, &Path) -> std::io::Result<()>,
    {
        if let Err(e) = write_int_file(&root.join(REVISION_FILE), u64::from(self.revision)) {
            warn!("Cannot record revision: {e:#}");
            return Err(Status::FailFilesystem);
        }

        let backup = self.backup_path();
        let had_previous = self.target.exists();
        if had_previous {
            if let Err(e) = remove_dir_all(&backup) {
                warn!("Cannot clear old backup: {e:#}");
                return Err(Status::FailFilesystem);
            }
            if let Err(e) = rename(&self.target, &backup) {
                warn!("Cannot move {} aside: {e}", self.target.display());
                return Err(Status::FailFilesystem);
            }
        }

        if let Err(e) = rename(root, &self.target) {
            warn!("Cannot publish {}: {e}", self.target.display());
            if had_previous {
                if let Err(restore) = rename(&backup, &self.target) {
                    warn!("Cannot restore previous install {}: {restore}", self.target.display());
                }
            }
            return Err(Status::FailFilesystem);
        }

        if had_previous {
            remove_dir_all_best_effort(&backup);
        }
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let name = self.target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        self.target.with_file_name(format!("{BACKUP_PREFIX}{name}"))
    }

    /// Removes the staging directory and whatever is left in it.
    pub(crate) fn cleanup(&self) {
        remove_dir_all_best_effort(&self.staging);
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn revision(&self) -> u32 {
        self.revision
    }

    pub(crate) fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub(crate) fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub(crate) fn staging(&self) -> &Path {
        &self.staging
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("request", &self.request)
            .field("url", &self.url)
            .field("attempts", &self.attempts)
            .field("remaining", &self.remaining)
            .field("downloaded", &self.downloaded)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
