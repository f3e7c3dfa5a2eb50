//! Catalogs: remote package indexes with a local cache.
//!
//! A catalog is identified by the id declared in its document and fetched
//! from a URL that may change over time. Each catalog owns a directory under
//! the install root:
//!
//! ```text
//! <install_root>/<catalog id>/
//! ├── catalog.xml     last accepted document, verbatim
//! ├── .timestamp      unix time of the last successful refresh
//! ├── _disabled_      present when the user disabled the catalog
//! └── <package dir>/  one directory per install
//! ```
//!
//! The network side of a refresh is driven by the
//! [`Registry`](crate::registry::Registry); this module holds the state and
//! the rules for accepting a new document.

pub mod filter;
pub mod package;

pub use filter::{Filter, MatchContext};
pub use package::Package;

use crate::constants::{CATALOG_FILE, DISABLED_MARKER, TIMESTAMP_FILE};
use crate::core::{PkgError, Result, Status};
use crate::metadata::CatalogDocument;
use crate::transport::RequestId;
use crate::utils::fs::{read_int_file, remove_dir_all, safe_write, write_int_file};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Refresh request in flight for one catalog.
#[derive(Debug)]
pub(crate) struct RefreshRequest {
    pub(crate) request: RequestId,
    pub(crate) status_code: Option<u16>,
    pub(crate) body: Vec<u8>,
    /// Status to restore if the request is cancelled
    pub(crate) previous: Status,
}

/// What changed when a document was applied.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ApplyReport {
    /// Ids seen for the first time
    pub(crate) added: Vec<String>,
    /// Ids that disappeared from the document
    pub(crate) orphaned: Vec<String>,
}

/// A package source and the packages it currently declares.
#[derive(Debug)]
pub struct Catalog {
    url: String,
    id: String,
    install_root: PathBuf,
    directory: Option<PathBuf>,
    status: Status,
    user_enabled: bool,
    retrieved: Option<DateTime<Utc>>,
    metadata: CatalogDocument,
    packages: Vec<Package>,
    index: HashMap<String, usize>,
    orphans: Vec<Package>,
    pub(crate) refresh: Option<RefreshRequest>,
    pub(crate) migrated_from: Option<String>,
    pub(crate) redirects: u32,
}

impl Catalog {
    /// An empty catalog that only knows where to fetch its document from.
    pub(crate) fn from_url(url: impl Into<String>, install_root: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            id: String::new(),
            install_root: install_root.into(),
            directory: None,
            status: Status::InProgress,
            user_enabled: true,
            retrieved: None,
            metadata: CatalogDocument::default(),
            packages: Vec::new(),
            index: HashMap::new(),
            orphans: Vec::new(),
            refresh: None,
            migrated_from: None,
            redirects: 0,
        }
    }

    /// Loads a catalog from the cached document in `dir`.
    ///
    /// The catalog ends up `Success`, or `FailVersion` when the cached
    /// document does not serve `app_version`.
    pub(crate) fn from_directory(dir: &Path, app_version: &str) -> Result<Self> {
        let path = dir.join(CATALOG_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| PkgError::filesystem("read cached catalog", &path, e))?;
        let doc = CatalogDocument::parse(&raw)?;

        let install_root = dir.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut catalog = Self::from_url(doc.url.clone().unwrap_or_default(), install_root);
        catalog.directory = Some(dir.to_path_buf());
        catalog.check_document(&doc)?;

        if dir.file_name().is_some_and(|name| name != doc.id.as_str()) {
            warn!("Catalog '{}' is cached in a directory named differently: {}", doc.id, dir.display());
        }

        let compatible = doc.is_compatible(app_version);
        catalog.apply_document(doc);
        catalog.user_enabled = !dir.join(DISABLED_MARKER).exists();
        catalog.retrieved = match read_int_file(&dir.join(TIMESTAMP_FILE)) {
            Ok(stamp) => stamp.and_then(|secs| DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)),
            Err(e) => {
                warn!("Ignoring unreadable timestamp of catalog '{}': {e:#}", catalog.id);
                None
            }
        };
        catalog.status = if compatible {
            Status::Success
        } else {
            Status::FailVersion
        };

        debug!(
            "Loaded catalog '{}' with {} packages from {}",
            catalog.id,
            catalog.packages.len(),
            dir.display()
        );
        Ok(catalog)
    }

    /// Checks a document before it replaces the current metadata.
    ///
    /// A single bad package rejects the whole document.
    pub(crate) fn check_document(&self, doc: &CatalogDocument) -> Result<()> {
        if doc.id.is_empty() {
            return Err(PkgError::ValidationFailed {
                package: String::new(),
                reason: "catalog document has no id".to_string(),
            });
        }
        if !is_catalog_dir_name(&doc.id) {
            return Err(PkgError::ValidationFailed {
                package: String::new(),
                reason: format!("catalog id '{}' cannot name a directory", doc.id),
            });
        }
        if !self.id.is_empty() && self.id != doc.id {
            return Err(PkgError::ValidationFailed {
                package: String::new(),
                reason: format!("catalog id changed from '{}' to '{}'", self.id, doc.id),
            });
        }

        let mut seen = HashSet::new();
        for pdoc in &doc.packages {
            let package = Package::new(doc.id.as_str(), pdoc.clone());
            package.validate()?;
            for id in package.variants() {
                if !seen.insert(id.to_string()) {
                    return Err(PkgError::ValidationFailed {
                        package: package.id().to_string(),
                        reason: format!("id '{id}' is declared more than once"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Replaces the metadata with a checked document.
    ///
    /// Packages that already existed are updated in place. Packages missing
    /// from the document move to the orphan list, where installs can still
    /// find them.
    pub(crate) fn apply_document(&mut self, mut doc: CatalogDocument) -> ApplyReport {
        let incoming = std::mem::take(&mut doc.packages);
        let mut previous: HashMap<String, Package> =
            self.packages.drain(..).map(|p| (p.id().to_string(), p)).collect();

        let mut report = ApplyReport::default();
        let mut packages = Vec::with_capacity(incoming.len());
        for pdoc in incoming {
            let package = if let Some(mut existing) = previous.remove(&pdoc.id) {
                existing.update_from(pdoc);
                existing
            } else if let Some(pos) = self.orphans.iter().position(|o| o.id() == pdoc.id) {
                let mut returning = self.orphans.remove(pos);
                returning.update_from(pdoc);
                returning
            } else {
                report.added.push(pdoc.id.clone());
                Package::new(doc.id.as_str(), pdoc)
            };
            packages.push(package);
        }

        let mut dropped: Vec<Package> = previous.into_values().collect();
        dropped.sort_by(|a, b| a.id().cmp(b.id()));
        for package in dropped {
            report.orphaned.push(package.id().to_string());
            self.orphans.push(package);
        }

        self.index = packages
            .iter()
            .enumerate()
            .flat_map(|(i, p)| p.variants().into_iter().map(move |v| (v.to_string(), i)))
            .collect();
        self.packages = packages;
        if self.directory.is_none() {
            self.directory = Some(self.install_root.join(&doc.id));
        }
        self.id = doc.id.clone();
        self.metadata = doc;
        report
    }

    /// Writes the accepted document and refresh time to the catalog directory.
    pub(crate) fn write_cache(dir: &Path, raw: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        safe_write(&dir.join(CATALOG_FILE), raw)?;
        write_int_file(&dir.join(TIMESTAMP_FILE), now.timestamp().max(0).unsigned_abs())?;
        Ok(())
    }

    /// Directory the catalog uses, or would use once its id is `id`.
    pub(crate) fn directory_for(&self, id: &str) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| self.install_root.join(id))
    }

    /// Persists the user's enable/disable choice.
    pub(crate) fn set_user_enabled(&mut self, enabled: bool) -> Result<()> {
        if let Some(dir) = &self.directory {
            let marker = dir.join(DISABLED_MARKER);
            if enabled {
                match fs::remove_file(&marker) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(PkgError::filesystem("remove disabled marker", &marker, e)),
                }
            } else {
                fs::create_dir_all(dir)
                    .and_then(|()| fs::write(&marker, b""))
                    .map_err(|e| PkgError::filesystem("write disabled marker", &marker, e))?;
            }
        }
        self.user_enabled = enabled;
        Ok(())
    }

    /// Deletes the catalog directory and everything in it.
    pub(crate) fn remove_directory(&self) -> Result<()> {
        match &self.directory {
            Some(dir) => Ok(remove_dir_all(dir)?),
            None => Ok(()),
        }
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub(crate) fn set_retrieved(&mut self, at: DateTime<Utc>) {
        self.retrieved = Some(at);
    }

    pub(crate) fn begin_refresh(&mut self, request: RequestId) {
        self.refresh = Some(RefreshRequest {
            request,
            status_code: None,
            body: Vec::new(),
            previous: self.status,
        });
        self.status = Status::InProgress;
    }

    /// Stable id; empty until the first document has been accepted.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// URL the document is currently fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata.description.as_deref()
    }

    /// Everything the last accepted document declared, except its packages.
    pub fn metadata(&self) -> &CatalogDocument {
        &self.metadata
    }

    /// Current status; `UserDisabled` overrides the refresh outcome.
    pub fn status(&self) -> Status {
        if self.user_enabled {
            self.status
        } else {
            Status::UserDisabled
        }
    }

    pub fn is_user_enabled(&self) -> bool {
        self.user_enabled
    }

    /// True if the catalog's packages should be offered.
    ///
    /// `FailDownload` keeps the catalog usable with its cached metadata; all
    /// other failures make it inert until a refresh succeeds.
    pub fn is_enabled(&self) -> bool {
        self.user_enabled
            && matches!(
                self.status,
                Status::Success | Status::Refreshed | Status::InProgress | Status::FailDownload
            )
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_some()
    }

    /// Directory holding the cache and the installs; `None` before the first
    /// document has been accepted.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Time of the last successful refresh.
    pub fn retrieved_time(&self) -> Option<DateTime<Utc>> {
        self.retrieved
    }

    /// Freshness window: the document's `max-age-sec`, else `default_secs`.
    pub fn max_age_secs(&self, default_secs: u64) -> u64 {
        self.metadata.max_age_secs.unwrap_or(default_secs)
    }

    /// True if the catalog should be fetched again.
    pub fn needs_refresh(&self, now: DateTime<Utc>, default_max_age_secs: u64) -> bool {
        if matches!(self.status, Status::FailVersion | Status::FailDownload) {
            return true;
        }
        match self.retrieved {
            None => true,
            Some(at) => {
                let age = now.signed_duration_since(at).num_seconds();
                age > i64::try_from(self.max_age_secs(default_max_age_secs)).unwrap_or(i64::MAX)
            }
        }
    }

    /// Packages in document order.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Packages dropped by a refresh that still exist for their installs.
    pub fn orphans(&self) -> &[Package] {
        &self.orphans
    }

    /// Looks up a package by its primary id or any variant id.
    pub fn package_by_id(&self, id: &str) -> Option<&Package> {
        self.index.get(id).and_then(|&i| self.packages.get(i))
    }

    /// Live package or orphan with this primary id.
    pub(crate) fn package_or_orphan(&self, id: &str) -> Option<&Package> {
        self.package_by_id(id).or_else(|| self.orphans.iter().find(|o| o.id() == id))
    }

    /// Where `package` is installed.
    pub fn install_path(&self, package: &Package) -> Option<PathBuf> {
        self.directory.as_ref().map(|dir| dir.join(package.dir_name()))
    }
}

/// A catalog id becomes a directory below the install root: exactly one
/// normal path component.
fn is_catalog_dir_name(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == id
    )
}
