//! Catalog refresh: fetching, version negotiation, migration.

use super::{CatalogKey, Registry, RequestOwner};
use crate::catalog::{Catalog, RefreshRequest};
use crate::constants::MAX_CATALOG_REDIRECTS;
use crate::core::Status;
use crate::metadata::CatalogDocument;
use crate::transport::TransportEvent;
use chrono::Utc;
use tracing::{debug, info, warn};

impl Registry {
    /// Starts fetching a catalog's document.
    ///
    /// At most one refresh per catalog is in flight; user-disabled catalogs
    /// are never fetched.
    pub(crate) fn start_refresh(&mut self, key: CatalogKey) {
        let Some(catalog) = self.catalogs.get(&key) else {
            return;
        };
        if catalog.is_refreshing() {
            debug!("Refresh of {} already in flight", catalog.url());
            return;
        }
        if !catalog.is_user_enabled() {
            debug!("Not refreshing disabled catalog '{}'", catalog.id());
            return;
        }
        let url = catalog.url().to_string();
        if url.is_empty() {
            warn!("Catalog '{}' has no URL to refresh from", catalog.id());
            self.complete_refresh(key, Status::FailDownload);
            return;
        }

        let request = self.next_request_id();
        if let Some(catalog) = self.catalogs.get_mut(&key) {
            catalog.begin_refresh(request);
        }
        self.requests.insert(request, RequestOwner::Catalog(key));
        debug!("Fetching catalog {url} ({request})");
        self.transport.start(request, &url);
    }

    pub(super) fn on_catalog_event(&mut self, key: CatalogKey, event: TransportEvent) {
        let Some(catalog) = self.catalogs.get_mut(&key) else {
            return;
        };
        let current = catalog.refresh.as_ref().map(|r| r.request);
        if current != Some(event.id()) {
            debug!("Ignoring stale event {} for catalog {}", event.id(), catalog.url());
            return;
        }

        match event {
            TransportEvent::Headers { status, .. } => {
                if let Some(refresh) = catalog.refresh.as_mut() {
                    refresh.status_code = Some(status);
                }
            }
            TransportEvent::Body { data, .. } => {
                if let Some(refresh) = catalog.refresh.as_mut() {
                    refresh.body.extend_from_slice(&data);
                }
            }
            TransportEvent::Done { .. } => {
                if let Some(refresh) = catalog.refresh.take() {
                    self.finish_refresh(key, refresh);
                }
            }
            TransportEvent::Failed { reason, .. } => {
                catalog.refresh = None;
                warn!("Fetching catalog {} failed: {reason}", catalog.url());
                self.complete_refresh(key, Status::FailDownload);
            }
        }
    }

    /// Decides what a completed response means for the catalog.
    fn finish_refresh(&mut self, key: CatalogKey, refresh: RefreshRequest) {
        let Some(catalog) = self.catalogs.get(&key) else {
            return;
        };
        let url = catalog.url().to_string();

        match refresh.status_code {
            Some(200) => {}
            Some(404) => {
                warn!("Catalog {url} not found");
                return self.complete_refresh(key, Status::FailNotFound);
            }
            code => {
                warn!("Catalog {url} answered {code:?}");
                return self.complete_refresh(key, Status::FailDownload);
            }
        }

        let raw = match String::from_utf8(refresh.body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Catalog {url} is not UTF-8: {e}");
                return self.complete_refresh(key, Status::FailExtract);
            }
        };
        let doc = match CatalogDocument::parse(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Cannot parse catalog {url}: {e}");
                return self.complete_refresh(key, Status::FailExtract);
            }
        };

        if !doc.is_compatible(&self.config.application_version) {
            return self.handle_incompatible(key, &doc);
        }

        let taken = self
            .catalogs
            .iter()
            .any(|(other, c)| *other != key && !doc.id.is_empty() && c.id() == doc.id);
        if taken {
            warn!("Catalog {url} declares id '{}', which another catalog already uses", doc.id);
            return self.complete_refresh(key, Status::FailValidation);
        }
        if let Err(e) = catalog.check_document(&doc) {
            warn!("Rejecting catalog {url}: {e}");
            return self.complete_refresh(key, Status::FailValidation);
        }

        let now = Utc::now();
        let dir = catalog.directory_for(&doc.id);
        if let Err(e) = Catalog::write_cache(&dir, &raw, now) {
            warn!("Cannot cache catalog '{}' in {}: {e:#}", doc.id, dir.display());
            return self.complete_refresh(key, Status::FailFilesystem);
        }

        let Some(catalog) = self.catalogs.get_mut(&key) else {
            return;
        };
        let report = catalog.apply_document(doc);
        catalog.set_retrieved(now);
        let catalog_id = catalog.id().to_string();
        let migrated_from = catalog.migrated_from.take();
        info!(
            "Catalog '{catalog_id}' refreshed: {} packages, {} new",
            catalog.packages().len(),
            report.added.len()
        );

        for orphan in &report.orphaned {
            let qualified = format!("{catalog_id}.{orphan}");
            if self.install_for_package(&qualified).is_some_and(|i| i.is_installed()) {
                warn!("Installed package '{qualified}' is no longer offered by its catalog");
            } else {
                info!("Package '{qualified}' is no longer offered");
            }
        }

        self.register_existing_installs(key);
        self.complete_refresh(key, Status::Refreshed);
        self.notify_packages_changed();

        if let Some(old_id) = migrated_from {
            self.migrate_installs(&old_id, key);
        }
    }

    /// Follows an `<alternate-version>` entry, or gives up with `FailVersion`.
    fn handle_incompatible(&mut self, key: CatalogKey, doc: &CatalogDocument) {
        let Some(catalog) = self.catalogs.get(&key) else {
            return;
        };
        let app_version = self.config.application_version.clone();
        let alternate = doc
            .find_alternate(&app_version)
            .and_then(|alt| Some((alt.url.clone()?, alt.id.clone())));
        let Some((alt_url, alt_id)) = alternate else {
            warn!("Catalog {} does not support version {app_version}", catalog.url());
            return self.complete_refresh(key, Status::FailVersion);
        };

        let own_id = if catalog.id().is_empty() { doc.id.as_str() } else { catalog.id() };
        let same_catalog = alt_id.as_deref().is_none_or(|id| id == own_id);

        if same_catalog {
            if alt_url == catalog.url() || catalog.redirects >= MAX_CATALOG_REDIRECTS {
                warn!("Catalog {} points to an unusable alternate {alt_url}", catalog.url());
                return self.complete_refresh(key, Status::FailVersion);
            }
            info!("Catalog '{own_id}' moved to {alt_url} for version {app_version}");
            if let Some(catalog) = self.catalogs.get_mut(&key) {
                catalog.set_url(alt_url);
                catalog.redirects += 1;
            }
            return self.start_refresh(key);
        }

        let new_id = alt_id.unwrap_or_default();
        if self.catalog_by_id(&new_id).is_some() || self.catalog_by_url(&alt_url).is_some() {
            info!("Alternate catalog '{new_id}' is already registered");
            return self.complete_refresh(key, Status::FailVersion);
        }

        info!("Catalog '{own_id}' is superseded by '{new_id}' at {alt_url}");
        let mut replacement = Catalog::from_url(alt_url, self.config.install_root.clone());
        replacement.migrated_from = Some(own_id.to_string());
        self.complete_refresh(key, Status::FailVersion);
        let new_key = self.insert_catalog(replacement);
        self.start_refresh(new_key);
    }

    /// Reinstalls what was installed from `old_id` out of the catalog at `new_key`.
    fn migrate_installs(&mut self, old_id: &str, new_key: CatalogKey) {
        let Some(new_catalog) = self.catalogs.get(&new_key) else {
            return;
        };
        let new_id = new_catalog.id().to_string();
        let mut wanted: Vec<String> = self
            .installs
            .values()
            .filter(|i| i.catalog_id() == old_id && i.is_installed())
            .filter(|i| new_catalog.package_by_id(i.package_id()).is_some())
            .map(|i| format!("{new_id}.{}", i.package_id()))
            .filter(|qualified| !self.install_by_package.contains_key(qualified))
            .collect();
        wanted.sort();
        wanted.dedup();

        for qualified in wanted {
            let result = self.mark_for_install(&qualified).and_then(|path| self.schedule_to_update(&path));
            match result {
                Ok(()) => info!("Migrating '{qualified}' from catalog '{old_id}'"),
                Err(e) => warn!("Cannot migrate '{qualified}' from catalog '{old_id}': {e}"),
            }
        }
    }

    /// Records the outcome of a refresh and tells the delegates.
    pub(super) fn complete_refresh(&mut self, key: CatalogKey, status: Status) {
        let Some(catalog) = self.catalogs.get_mut(&key) else {
            return;
        };
        catalog.set_status(status);
        catalog.redirects = 0;
        if status.is_failure() {
            debug!("Catalog {} refresh ended with {status}", catalog.url());
        }
        for delegate in &mut self.delegates {
            delegate.catalog_refreshed(catalog, status);
        }
    }

    /// Aborts an in-flight refresh, restoring the status it started from.
    pub(super) fn cancel_refresh(&mut self, key: CatalogKey) {
        let Some(catalog) = self.catalogs.get_mut(&key) else {
            return;
        };
        let Some(refresh) = catalog.refresh.take() else {
            return;
        };
        catalog.set_status(refresh.previous);
        debug!("Cancelled refresh of {}", catalog.url());
        self.requests.remove(&refresh.request);
        self.transport.cancel(refresh.request);
    }
}
