//! The registry: root object owning every catalog and install.
//!
//! A [`Registry`] is driven from a single thread. Operations such as
//! [`refresh`](Registry::refresh) or [`install`](Registry::install) only
//! start network requests; their effects are applied when the caller drives
//! the registry with [`poll`](Registry::poll) or
//! [`run_until_idle`](Registry::run_until_idle). Outcomes are reported
//! through [`Status`] values, install callbacks and [`RegistryDelegate`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use pkgcat::{Registry, RegistryConfig, ReqwestTransport};
//!
//! # async fn example() -> pkgcat::core::Result<()> {
//! let config = RegistryConfig::load().await?;
//! let transport = ReqwestTransport::new(&config)?;
//! let mut registry = Registry::new(config, Box::new(transport))?;
//!
//! registry.add_catalog("https://example.org/catalog.xml")?;
//! registry.run_until_idle().await;
//!
//! let path = registry.install("main.c172")?;
//! registry.run_until_idle().await;
//! println!("{:?}", registry.install_at(&path).map(|i| i.status()));
//! # Ok(())
//! # }
//! ```

pub mod delegate;
mod install;
mod refresh;

pub use delegate::RegistryDelegate;

use crate::catalog::{Catalog, Filter, MatchContext, Package};
use crate::config::RegistryConfig;
use crate::constants::CATALOG_FILE;
use crate::core::{PkgError, Result};
use crate::install::Install;
use crate::transport::{HttpTransport, RequestId, TransportEvent};
use crate::utils::fs::ensure_dir;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Internal handle of a catalog; stable while the catalog is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct CatalogKey(u64);

/// Who is waiting for the events of a request.
#[derive(Debug, Clone)]
enum RequestOwner {
    Catalog(CatalogKey),
    Install(PathBuf),
}

/// Owns catalogs and installs and performs all their HTTP traffic.
pub struct Registry {
    config: RegistryConfig,
    transport: Box<dyn HttpTransport>,
    catalogs: BTreeMap<CatalogKey, Catalog>,
    next_catalog: u64,
    installs: HashMap<PathBuf, Install>,
    install_by_package: HashMap<String, PathBuf>,
    requests: HashMap<RequestId, RequestOwner>,
    next_request: u64,
    update_queue: VecDeque<PathBuf>,
    active: HashSet<PathBuf>,
    delegates: Vec<Box<dyn RegistryDelegate>>,
    rng: StdRng,
}

impl Registry {
    /// Opens the content tree at `config.install_root`.
    ///
    /// Every subdirectory holding a `catalog.xml` is loaded as a catalog, and
    /// every package directory found inside is registered as an install.
    pub fn new(config: RegistryConfig, transport: Box<dyn HttpTransport>) -> Result<Self> {
        config.validate()?;
        ensure_dir(&config.install_root)?;

        let mut registry = Self {
            config,
            transport,
            catalogs: BTreeMap::new(),
            next_catalog: 0,
            installs: HashMap::new(),
            install_by_package: HashMap::new(),
            requests: HashMap::new(),
            next_request: 0,
            update_queue: VecDeque::new(),
            active: HashSet::new(),
            delegates: Vec::new(),
            rng: StdRng::from_entropy(),
        };
        registry.scan_install_root()?;
        Ok(registry)
    }

    fn scan_install_root(&mut self) -> Result<()> {
        let root = self.config.install_root.clone();
        let entries =
            fs::read_dir(&root).map_err(|e| PkgError::filesystem("scan install root", &root, e))?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.join(CATALOG_FILE).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            match Catalog::from_directory(&dir, &self.config.application_version) {
                Ok(catalog) if self.catalog_by_id(catalog.id()).is_some() => {
                    warn!("Ignoring second copy of catalog '{}' in {}", catalog.id(), dir.display());
                }
                Ok(catalog) => {
                    let key = self.insert_catalog(catalog);
                    self.register_existing_installs(key);
                }
                Err(e) => warn!("Ignoring catalog directory {}: {e}", dir.display()),
            }
        }

        info!(
            "Loaded {} catalogs and {} installs from {}",
            self.catalogs.len(),
            self.installs.len(),
            root.display()
        );
        Ok(())
    }

    fn insert_catalog(&mut self, catalog: Catalog) -> CatalogKey {
        self.next_catalog += 1;
        let key = CatalogKey(self.next_catalog);
        self.catalogs.insert(key, catalog);
        key
    }

    /// Registers installs for package directories that exist on disk.
    fn register_existing_installs(&mut self, key: CatalogKey) {
        let Some(catalog) = self.catalogs.get(&key) else {
            return;
        };
        let found: Vec<Install> = catalog
            .packages()
            .iter()
            .filter_map(|package| {
                let path = catalog.install_path(package)?;
                let known = self.installs.contains_key(&path)
                    || self.install_by_package.contains_key(&package.qualified_id());
                (path.is_dir() && !known).then(|| Install::from_disk(path, package))
            })
            .collect();
        for install in found {
            debug!("Found install of '{}' at revision {}", install.qualified_id(), install.revision());
            self.register(install);
        }
    }

    fn register(&mut self, install: Install) {
        self.install_by_package.insert(install.qualified_id(), install.path().to_path_buf());
        self.installs.insert(install.path().to_path_buf(), install);
    }

    fn unregister(&mut self, path: &Path) -> Option<Install> {
        let install = self.installs.remove(path)?;
        self.install_by_package.remove(&install.qualified_id());
        self.update_queue.retain(|queued| queued != path);
        self.active.remove(path);
        Some(install)
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Version negotiated against catalog `<version>` entries.
    pub fn application_version(&self) -> &str {
        &self.config.application_version
    }

    /// Locale used for localized names and filter text search.
    pub fn locale(&self) -> Option<&str> {
        self.config.locale.as_deref()
    }

    pub fn set_locale(&mut self, locale: Option<String>) {
        self.config.locale = locale;
    }

    /// Adds an observer for every catalog and install.
    pub fn add_delegate(&mut self, delegate: Box<dyn RegistryDelegate>) {
        self.delegates.push(delegate);
    }

    /// Makes mirror selection reproducible.
    pub fn seed_mirror_selection(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    // ---- driving ----

    /// Applies every transport event that is ready, without waiting.
    ///
    /// Returns the number of events handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.transport.try_next_event() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Drives the registry until no request is in flight.
    ///
    /// Installs waiting in the queue are started as capacity frees up, so
    /// this also waits for them.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.poll();
            if self.requests.is_empty() {
                break;
            }
            match self.transport.next_event().await {
                Some(event) => self.dispatch(event),
                None => {
                    debug!("Transport has no more events; {} requests still open", self.requests.len());
                    break;
                }
            }
        }
    }

    /// True while requests are in flight or installs are queued.
    pub fn has_pending_work(&self) -> bool {
        !self.requests.is_empty() || !self.update_queue.is_empty()
    }

    fn dispatch(&mut self, event: TransportEvent) {
        let id = event.id();
        let Some(owner) = self.requests.get(&id).cloned() else {
            debug!("Dropping event for finished or cancelled request {id}");
            return;
        };
        if event.is_terminal() {
            self.requests.remove(&id);
        }
        match owner {
            RequestOwner::Catalog(key) => self.on_catalog_event(key, event),
            RequestOwner::Install(path) => self.on_install_event(&path, event),
        }
    }

    // ---- catalogs ----

    /// Every registered catalog, in registration order.
    pub fn catalogs(&self) -> impl Iterator<Item = &Catalog> {
        self.catalogs.values()
    }

    pub fn catalog_by_id(&self, id: &str) -> Option<&Catalog> {
        self.catalogs.values().find(|c| !c.id().is_empty() && c.id() == id)
    }

    pub fn catalog_by_url(&self, url: &str) -> Option<&Catalog> {
        self.catalogs.values().find(|c| c.url() == url)
    }

    /// Resolves a catalog id or URL.
    pub(crate) fn key_for(&self, id_or_url: &str) -> Option<CatalogKey> {
        self.catalogs
            .iter()
            .find(|(_, c)| !c.id().is_empty() && c.id() == id_or_url)
            .or_else(|| self.catalogs.iter().find(|(_, c)| c.url() == id_or_url))
            .map(|(key, _)| *key)
    }

    /// Registers a catalog by URL and starts fetching it.
    ///
    /// A URL that is already registered is left alone.
    pub fn add_catalog(&mut self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PkgError::ConfigError {
                message: "catalog URL is empty".to_string(),
            });
        }
        if self.catalog_by_url(url).is_some() {
            debug!("Catalog {url} is already registered");
            return Ok(());
        }

        let key = self.insert_catalog(Catalog::from_url(url, self.config.install_root.clone()));
        info!("Added catalog {url}");
        self.start_refresh(key);
        Ok(())
    }

    /// Refreshes every enabled catalog that is stale, or all of them with `force`.
    pub fn refresh(&mut self, force: bool) {
        let now = Utc::now();
        let max_age = self.config.max_age_secs;
        let stale: Vec<CatalogKey> = self
            .catalogs
            .iter()
            .filter(|(_, c)| c.is_user_enabled() && (force || c.needs_refresh(now, max_age)))
            .map(|(key, _)| *key)
            .collect();
        debug!("Refreshing {} of {} catalogs", stale.len(), self.catalogs.len());
        for key in stale {
            self.start_refresh(key);
        }
    }

    /// Refreshes one catalog, identified by id or URL.
    pub fn refresh_catalog(&mut self, id_or_url: &str) -> Result<()> {
        let key = self.key_for(id_or_url).ok_or_else(|| PkgError::CatalogNotFound {
            id: id_or_url.to_string(),
        })?;
        self.start_refresh(key);
        Ok(())
    }

    /// Enables or disables a catalog, persisting the choice.
    ///
    /// Disabling cancels a running refresh. Enabling refreshes the catalog
    /// if it is stale.
    pub fn set_catalog_enabled(&mut self, id_or_url: &str, enabled: bool) -> Result<()> {
        let key = self.key_for(id_or_url).ok_or_else(|| PkgError::CatalogNotFound {
            id: id_or_url.to_string(),
        })?;
        let Some(catalog) = self.catalogs.get_mut(&key) else {
            return Ok(());
        };
        if catalog.is_user_enabled() == enabled {
            return Ok(());
        }
        catalog.set_user_enabled(enabled)?;
        info!("Catalog '{}' {}", catalog.id(), if enabled { "enabled" } else { "disabled" });

        if enabled {
            let stale = catalog.needs_refresh(Utc::now(), self.config.max_age_secs);
            if stale {
                self.start_refresh(key);
            }
        } else {
            self.cancel_refresh(key);
        }
        self.notify_packages_changed();
        Ok(())
    }

    /// Uninstalls every package of a catalog and deletes its directory.
    pub fn remove_catalog(&mut self, id_or_url: &str) -> Result<()> {
        let key = self.key_for(id_or_url).ok_or_else(|| PkgError::CatalogNotFound {
            id: id_or_url.to_string(),
        })?;
        self.cancel_refresh(key);

        let catalog_id = self.catalogs.get(&key).map(|c| c.id().to_string()).unwrap_or_default();
        let mut paths: Vec<PathBuf> = self
            .installs
            .values()
            .filter(|i| !catalog_id.is_empty() && i.catalog_id() == catalog_id)
            .map(|i| i.path().to_path_buf())
            .collect();
        paths.sort();
        for path in paths {
            self.uninstall(&path)?;
        }

        if let Some(catalog) = self.catalogs.remove(&key) {
            catalog.remove_directory()?;
            info!("Removed catalog '{}' ({})", catalog.id(), catalog.url());
        }
        self.notify_packages_changed();
        Ok(())
    }

    fn notify_packages_changed(&mut self) {
        for delegate in &mut self.delegates {
            delegate.available_packages_changed();
        }
    }

    // ---- packages ----

    /// Looks up a package by qualified id (`catalog.package`) or by bare id
    /// across all catalogs. Variant ids are accepted too.
    pub fn package_by_id(&self, id: &str) -> Option<&Package> {
        let qualified = self.catalogs.values().filter(|c| !c.id().is_empty()).find_map(|catalog| {
            let rest = id.strip_prefix(catalog.id())?.strip_prefix('.')?;
            catalog.package_by_id(rest)
        });
        qualified.or_else(|| self.catalogs.values().find_map(|c| c.package_by_id(id)))
    }

    /// Package record of an install, including packages dropped by their catalog.
    pub fn package_for_install(&self, install: &Install) -> Option<&Package> {
        self.catalog_by_id(install.catalog_id())?.package_or_orphan(install.package_id())
    }

    fn enabled_packages(&self) -> impl Iterator<Item = &Package> {
        self.catalogs.values().filter(|c| c.is_enabled()).flat_map(|c| c.packages().iter())
    }

    /// Packages of enabled catalogs that match `filter`.
    pub fn packages_matching(&self, filter: &Filter) -> Vec<&Package> {
        let locale = self.locale();
        self.enabled_packages()
            .filter(|package| {
                let ctx = MatchContext {
                    installed: self
                        .install_for_package(&package.qualified_id())
                        .is_some_and(Install::is_installed),
                    locale,
                };
                package.matches(filter, &ctx)
            })
            .collect()
    }

    /// Packages with content on disk, sorted by qualified id.
    pub fn installed_packages(&self) -> Vec<&Package> {
        let mut installed: Vec<&Package> = self
            .installs
            .values()
            .filter(|i| i.is_installed())
            .filter_map(|i| self.package_for_install(i))
            .collect();
        installed.sort_by_key(|p| p.qualified_id());
        installed
    }

    /// Installed packages whose enabled catalog offers a newer revision.
    pub fn packages_needing_update(&self) -> Vec<&Package> {
        let mut outdated: Vec<&Package> = self
            .installs
            .values()
            .filter(|i| i.is_installed())
            .filter_map(|i| {
                let catalog = self.catalog_by_id(i.catalog_id()).filter(|c| c.is_enabled())?;
                let package = catalog.package_by_id(i.package_id())?;
                i.has_update(package).then_some(package)
            })
            .collect();
        outdated.sort_by_key(|p| p.qualified_id());
        outdated
    }

    // ---- installs ----

    /// Install registered for a package, by qualified id.
    pub fn install_for_package(&self, qualified_id: &str) -> Option<&Install> {
        self.install_by_package.get(qualified_id).and_then(|path| self.installs.get(path))
    }

    pub fn install_at(&self, path: &Path) -> Option<&Install> {
        self.installs.get(path)
    }

    /// Mutable access, used to subscribe to install callbacks.
    pub fn install_at_mut(&mut self, path: &Path) -> Option<&mut Install> {
        self.installs.get_mut(path)
    }

    pub fn installs(&self) -> impl Iterator<Item = &Install> {
        self.installs.values()
    }

    /// True if the install waits for a free download slot.
    pub fn is_install_queued(&self, path: &Path) -> bool {
        self.update_queue.iter().any(|queued| queued == path)
    }

    /// Number of installs currently downloading.
    pub fn active_downloads(&self) -> usize {
        self.active.len()
    }
}
