//! Global constants used throughout the pkgcat codebase.
//!
//! This module contains on-disk file names, freshness windows, concurrency
//! limits and transport timeouts that are shared across the catalog, install
//! and registry modules. Defining them centrally keeps the persisted layout
//! of the content tree in one place.

use std::time::Duration;

/// Last-known-good catalog metadata, stored in each catalog directory.
pub const CATALOG_FILE: &str = "catalog.xml";

/// Unix timestamp (seconds) of the last successful catalog refresh.
pub const TIMESTAMP_FILE: &str = ".timestamp";

/// Presence of this file marks a catalog as disabled by the user.
///
/// The file content is irrelevant.
pub const DISABLED_MARKER: &str = "_disabled_";

/// Installed revision of a package, stored inside its install directory.
///
/// Absence of the file means revision 0 ("not yet fully installed").
pub const REVISION_FILE: &str = ".revision";

/// Prefix of the private staging directory an archive is extracted into.
///
/// The full name is `_extract_<md5>`, created next to the install directory.
pub const STAGING_PREFIX: &str = "_extract_";

/// Prefix of the backup an existing install directory is moved to while the
/// new content is published.
pub const BACKUP_PREFIX: &str = "_previous_";

/// Default catalog freshness window (one day).
///
/// A catalog document may override this with its own `max-age-sec` key.
pub const DEFAULT_MAX_AGE_SECS: u64 = 60 * 60 * 24;

/// Default number of installs that may download at the same time.
///
/// Further scheduled installs wait in submission order.
pub const DEFAULT_MAX_CONCURRENT_INSTALLS: usize = 2;

/// Default per-request timeout for the HTTP transport (5 minutes).
///
/// Package archives can be large, so this is generous compared to the
/// metadata documents that share the same client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Environment variable that overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "PKGCAT_CONFIG";

/// How often a catalog may move to a new URL of its own during one refresh.
pub const MAX_CATALOG_REDIRECTS: u32 = 4;
