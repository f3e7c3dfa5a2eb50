//! Install scheduling and the download pipeline.
//!
//! Installs wait in a FIFO queue until one of the download slots
//! (`max_concurrent_installs`) is free. Each download walks its mirrors in
//! random order, each at most once, until one attempt publishes the content
//! or a non-retryable status ends it.

use super::{Registry, RequestOwner};
use crate::catalog::Package;
use crate::core::{PkgError, Result, Status};
use crate::install::Install;
use crate::install::download::{Download, DownloadPlan};
use crate::transport::TransportEvent;
use crate::utils::fs::is_empty_dir;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl Registry {
    /// Resolves the declared dependencies of a package.
    ///
    /// Each dependency is looked up in the package's own catalog first, then
    /// in all catalogs. A dependency must exist, offer at least the declared
    /// revision, and have no dependencies of its own.
    pub fn dependencies(&self, id: &str) -> Result<Vec<&Package>> {
        let package = self.package_by_id(id).ok_or_else(|| PkgError::PackageNotFound {
            id: id.to_string(),
        })?;
        let home = self.catalog_by_id(package.catalog_id());

        package
            .depends()
            .iter()
            .map(|spec| {
                let found = home
                    .and_then(|catalog| catalog.package_by_id(&spec.id))
                    .or_else(|| self.package_by_id(&spec.id))
                    .ok_or_else(|| PkgError::DependencyNotFound {
                        package: package.qualified_id(),
                        dependency: spec.id.clone(),
                    })?;
                if found.revision() < spec.revision {
                    return Err(PkgError::DependencyTooOld {
                        package: package.qualified_id(),
                        dependency: found.qualified_id(),
                        required: spec.revision,
                        found: found.revision(),
                    });
                }
                if !found.depends().is_empty() {
                    return Err(PkgError::NestedDependency {
                        package: package.qualified_id(),
                        dependency: found.qualified_id(),
                    });
                }
                Ok(found)
            })
            .collect()
    }

    /// Installs a package and whatever it depends on.
    ///
    /// Returns the install directory. The download runs in the background;
    /// subscribe through [`install_at_mut`](Self::install_at_mut) or a
    /// [`RegistryDelegate`](super::RegistryDelegate) to learn the outcome.
    pub fn install(&mut self, id: &str) -> Result<PathBuf> {
        let (qualified, _) = self.install_target(id)?;

        if let Some(existing) = self.install_by_package.get(&qualified).cloned() {
            let idle = self
                .installs
                .get(&existing)
                .is_some_and(|i| !i.is_installed() && !i.is_downloading());
            if idle && !self.is_install_queued(&existing) {
                self.schedule_to_update(&existing)?;
            }
            return Ok(existing);
        }

        // Fails before anything is registered if the graph is broken
        self.dependencies(&qualified)?;
        let path = self.register_new_install(&qualified)?;
        self.schedule_to_update(&path)?;
        Ok(path)
    }

    /// Registers an install for a package and creates its directory,
    /// without downloading anything.
    pub fn mark_for_install(&mut self, id: &str) -> Result<PathBuf> {
        let path = self.register_new_install(id)?;
        if let Err(e) = fs::create_dir_all(&path) {
            if self.installs.get(&path).is_some_and(|i| !i.is_installed()) {
                self.unregister(&path);
            }
            return Err(PkgError::filesystem("create install directory", &path, e));
        }
        Ok(path)
    }

    /// Queues a download of the latest revision for the install at `path`.
    ///
    /// Missing dependencies are queued ahead of it.
    pub fn schedule_to_update(&mut self, path: &Path) -> Result<()> {
        let install = self.installs.get(path).ok_or_else(|| PkgError::InstallNotFound {
            path: path.display().to_string(),
        })?;
        if install.is_downloading() || self.is_install_queued(path) {
            return Ok(());
        }
        let qualified = install.qualified_id();

        self.install_dependencies(&qualified)?;
        debug!("Queued '{qualified}'");
        self.update_queue.push_back(path.to_path_buf());
        self.start_queued_updates();
        Ok(())
    }

    /// Queues updates for every installed package with a newer revision.
    ///
    /// Returns how many were queued.
    pub fn schedule_all_updates(&mut self) -> usize {
        let targets: Vec<(String, PathBuf)> = self
            .packages_needing_update()
            .into_iter()
            .filter_map(|package| {
                let qualified = package.qualified_id();
                let path = self.install_by_package.get(&qualified)?.clone();
                Some((qualified, path))
            })
            .collect();

        let mut queued = 0;
        for (qualified, path) in targets {
            match self.schedule_to_update(&path) {
                Ok(()) => queued += 1,
                Err(e) => warn!("Cannot update '{qualified}': {e}"),
            }
        }
        queued
    }

    /// Starts downloading right away, ignoring the concurrency ceiling.
    pub fn start_update(&mut self, path: &Path) -> Result<()> {
        let install = self.installs.get(path).ok_or_else(|| PkgError::InstallNotFound {
            path: path.display().to_string(),
        })?;
        if install.is_downloading() {
            return Ok(());
        }
        if self.staging_in_use(path) {
            debug!("Staging directory of {} is busy, waiting", path.display());
            if !self.is_install_queued(path) {
                self.update_queue.push_back(path.to_path_buf());
            }
            return Ok(());
        }
        let qualified = install.qualified_id();
        let package = self
            .catalog_by_id(install.catalog_id())
            .and_then(|catalog| catalog.package_by_id(install.package_id()))
            .ok_or_else(|| PkgError::PackageNotFound {
                id: qualified.clone(),
            })?;
        let plan = DownloadPlan {
            mirrors: package.download_urls().to_vec(),
            md5: package.md5().to_string(),
            content_root: package.content_root().to_string(),
            revision: package.revision(),
            target: path.to_path_buf(),
        };
        let revision = plan.revision;

        self.update_queue.retain(|queued| queued != path);
        self.active.insert(path.to_path_buf());
        if let Some(install) = self.installs.get_mut(path) {
            install.begin_download(Download::new(plan));
        }
        info!("Installing '{qualified}' revision {revision} into {}", path.display());
        for delegate in &mut self.delegates {
            delegate.start_install(&qualified, path);
        }

        self.next_attempt(path, Status::FailDownload);
        Ok(())
    }

    /// Aborts a running or queued download.
    ///
    /// An install that never had content on disk is forgotten afterwards.
    pub fn cancel_download(&mut self, path: &Path) -> Result<()> {
        let install = self.installs.get(path).ok_or_else(|| PkgError::InstallNotFound {
            path: path.display().to_string(),
        })?;
        let request = install.download.as_ref().map(|d| d.request);
        let queued = self.is_install_queued(path);
        if request.is_none() && !queued {
            return Ok(());
        }

        self.update_queue.retain(|q| q != path);
        if let Some(request) = request {
            self.requests.remove(&request);
            self.transport.cancel(request);
        }
        info!("Cancelled download into {}", path.display());
        self.finish_download(path, Status::UserCancelled, None);

        if self.installs.get(path).is_some_and(|i| !i.is_installed()) {
            self.unregister(path);
            if is_empty_dir(path) {
                if let Err(e) = fs::remove_dir(path) {
                    debug!("Leaving {}: {e}", path.display());
                }
            }
        }
        Ok(())
    }

    /// Removes an install and its directory.
    pub fn uninstall(&mut self, path: &Path) -> Result<()> {
        let qualified = self
            .installs
            .get(path)
            .map(Install::qualified_id)
            .ok_or_else(|| PkgError::InstallNotFound {
                path: path.display().to_string(),
            })?;
        self.cancel_download(path)?;

        match fs::remove_dir_all(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PkgError::filesystem("remove install directory", path, e)),
        }
        self.unregister(path);
        info!("Uninstalled '{qualified}' from {}", path.display());
        for delegate in &mut self.delegates {
            delegate.finish_uninstall(&qualified);
        }
        Ok(())
    }

    /// Qualified id and install directory of a package.
    fn install_target(&self, id: &str) -> Result<(String, PathBuf)> {
        let package = self.package_by_id(id).ok_or_else(|| PkgError::PackageNotFound {
            id: id.to_string(),
        })?;
        let path = self
            .catalog_by_id(package.catalog_id())
            .and_then(|catalog| catalog.install_path(package))
            .ok_or_else(|| PkgError::CatalogNotFound {
                id: package.catalog_id().to_string(),
            })?;
        Ok((package.qualified_id(), path))
    }

    /// Registers an install for `id`, or returns the one already registered.
    fn register_new_install(&mut self, id: &str) -> Result<PathBuf> {
        let (qualified, path) = self.install_target(id)?;
        if let Some(existing) = self.install_by_package.get(&qualified) {
            return Ok(existing.clone());
        }
        if let Some(other) = self.installs.get(&path) {
            return Err(PkgError::ValidationFailed {
                package: qualified,
                reason: format!("{} is already used by '{}'", path.display(), other.qualified_id()),
            });
        }

        let package = self.package_by_id(&qualified).ok_or_else(|| PkgError::PackageNotFound {
            id: qualified.clone(),
        })?;
        let install = if path.is_dir() {
            Install::from_disk(path.clone(), package)
        } else {
            Install::new(path.clone(), package, 0)
        };
        self.register(install);
        Ok(path)
    }

    /// Queues the dependencies of `qualified` that are missing or too old.
    fn install_dependencies(&mut self, qualified: &str) -> Result<()> {
        let required: Vec<(String, u32)> = {
            let package = self.package_by_id(qualified).ok_or_else(|| PkgError::PackageNotFound {
                id: qualified.to_string(),
            })?;
            let deps = self.dependencies(qualified)?;
            package.depends().iter().zip(deps).map(|(spec, dep)| (dep.qualified_id(), spec.revision)).collect()
        };

        for (dependency, revision) in required {
            let path = match self.install_for_package(&dependency) {
                Some(install) if install.revision() >= revision || install.is_downloading() => continue,
                Some(install) => install.path().to_path_buf(),
                None => self.register_new_install(&dependency)?,
            };
            if !self.is_install_queued(&path) {
                debug!("Queued dependency '{dependency}' of '{qualified}'");
                self.update_queue.push_back(path);
            }
        }
        Ok(())
    }

    /// Starts queued downloads while slots are free.
    pub(super) fn start_queued_updates(&mut self) {
        let ceiling = self.config.max_concurrent_installs.max(1);
        while self.active.len() < ceiling {
            let Some(index) = self.update_queue.iter().position(|p| !self.staging_in_use(p)) else {
                break;
            };
            let Some(path) = self.update_queue.remove(index) else {
                break;
            };
            if let Err(e) = self.start_update(&path) {
                warn!("Cannot start download into {}: {e}", path.display());
                if let Some(install) = self.installs.get_mut(&path) {
                    let outcome = install.settle(Status::FailNotFound, None);
                    for delegate in &mut self.delegates {
                        delegate.finish_install(&outcome);
                    }
                }
            }
        }
    }

    /// True if another running download stages into the directory the
    /// install at `path` would use.
    ///
    /// Staging directories are named after the archive checksum, so two
    /// packages sharing an archive must not download at the same time.
    fn staging_in_use(&self, path: &Path) -> bool {
        let Some(staging) = self.installs.get(path).and_then(|install| {
            let package = self.catalog_by_id(install.catalog_id())?.package_by_id(install.package_id())?;
            Some(Download::staging_dir(path, package.md5()))
        }) else {
            return false;
        };
        self.installs.iter().any(|(other, install)| {
            other != path && install.download.as_ref().is_some_and(|d| d.staging() == staging)
        })
    }

    /// Sends the next request of a download, or ends it with `last` when
    /// every mirror has been tried.
    fn next_attempt(&mut self, path: &Path, last: Status) {
        let request = self.next_request_id();
        let Some(download) = self.installs.get_mut(path).and_then(|i| i.download.as_mut()) else {
            return;
        };
        let Some(url) = download.pick_mirror(&mut self.rng) else {
            warn!("No mirror left for {}", path.display());
            return self.finish_download(path, last, None);
        };
        if let Err(e) = download.begin_attempt(request, url.clone()) {
            warn!("Cannot prepare staging directory for {}: {e}", path.display());
            return self.finish_download(path, Status::FailFilesystem, None);
        }
        debug!("Downloading {url} (attempt {}, {request})", download.attempts());

        self.requests.insert(request, RequestOwner::Install(path.to_path_buf()));
        self.transport.start(request, &url);
    }

    pub(super) fn on_install_event(&mut self, path: &Path, event: TransportEvent) {
        let Some(install) = self.installs.get_mut(path) else {
            return;
        };
        let Some(download) = install.download.as_mut() else {
            return;
        };
        if download.request != event.id() {
            debug!("Ignoring stale event {} for {}", event.id(), path.display());
            return;
        }

        match event {
            TransportEvent::Headers {
                status, content_length, ..
            } => download.on_headers(status, content_length),
            TransportEvent::Body { data, .. } => {
                download.on_body(&data);
                let downloaded = download.downloaded();
                let total = download.content_length().unwrap_or(0);
                install.completion.progress(downloaded, total);
                for delegate in &mut self.delegates {
                    delegate.install_progress(path, downloaded, total);
                }
            }
            TransportEvent::Done { .. } => self.complete_attempt(path),
            TransportEvent::Failed { reason, .. } => {
                warn!("Download from {} failed: {reason}", download.url());
                self.retry_or_fail(path, Status::FailDownload);
            }
        }
    }

    /// Verifies and publishes a completed response.
    fn complete_attempt(&mut self, path: &Path) {
        let Some(download) = self.installs.get_mut(path).and_then(|i| i.download.as_mut()) else {
            return;
        };
        let published = match download.finish() {
            Ok(root) => download.publish(&root).map(|()| download.revision()),
            Err(status) => Err(status),
        };
        match published {
            Ok(revision) => self.finish_download(path, Status::Success, Some(revision)),
            Err(status) => self.retry_or_fail(path, status),
        }
    }

    fn retry_or_fail(&mut self, path: &Path, status: Status) {
        let Some(download) = self.installs.get_mut(path).and_then(|i| i.download.as_mut()) else {
            return;
        };
        download.cleanup();
        if status.is_retryable() && download.has_mirrors_left() {
            info!("Attempt on {} ended with {status}, trying another mirror", download.url());
            self.next_attempt(path, status);
        } else {
            self.finish_download(path, status, None);
        }
    }

    /// Ends the download of an install and frees its slot.
    fn finish_download(&mut self, path: &Path, status: Status, revision: Option<u32>) {
        self.active.remove(path);
        let Some(install) = self.installs.get_mut(path) else {
            return;
        };
        if let Some(download) = &install.download {
            download.cleanup();
        }
        let outcome = install.settle(status, revision);
        if outcome.is_success() {
            info!("Installed '{}' revision {}", outcome.package_id, outcome.revision);
        } else {
            warn!("Install of '{}' ended with {status}", outcome.package_id);
        }
        for delegate in &mut self.delegates {
            delegate.finish_install(&outcome);
        }
        self.start_queued_updates();
    }
}
