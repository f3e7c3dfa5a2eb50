//! Registry-wide observers.

use crate::catalog::Catalog;
use crate::core::Status;
use crate::install::InstallOutcome;
use std::path::Path;

/// Receives notifications about every catalog and install of a registry.
///
/// All methods default to doing nothing; implement the ones you need.
/// Delegates run on the thread that drives the registry, inside the call
/// that caused the notification.
pub trait RegistryDelegate {
    /// A catalog refresh terminated with `status`.
    fn catalog_refreshed(&mut self, _catalog: &Catalog, _status: Status) {}

    /// A download started for the install at `path`.
    fn start_install(&mut self, _package_id: &str, _path: &Path) {}

    /// Bytes arrived for the install at `path`; `total` is 0 when unknown.
    fn install_progress(&mut self, _path: &Path, _downloaded: u64, _total: u64) {}

    /// A download terminated.
    fn finish_install(&mut self, _outcome: &InstallOutcome) {}

    /// The package was uninstalled and its directory removed.
    fn finish_uninstall(&mut self, _package_id: &str) {}

    /// The set of offered packages changed (refresh, catalog added or removed,
    /// catalog enabled or disabled).
    fn available_packages_changed(&mut self) {}
}
