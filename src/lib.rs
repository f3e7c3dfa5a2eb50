//! pkgcat - package catalogs and content installation
//!
//! A library for discovering remote content catalogs and installing the
//! packages they describe into a local content tree, with revision-based
//! update detection and atomic replacement of installed directories.
//!
//! # Architecture Overview
//!
//! - A **catalog** is a remote XML property document listing packages. It is
//!   fetched from a URL, checked against the running application version,
//!   and cached on disk.
//! - A **package** is one installable archive plus its metadata: revision,
//!   MD5 checksum, mirror URLs, target directory, variants, tags and
//!   dependencies.
//! - An **install** is the on-disk copy of a package, with the installed
//!   revision recorded in a `.revision` file.
//! - The **registry** owns all of the above and performs every HTTP request
//!   through an [`HttpTransport`](transport::HttpTransport).
//!
//! Downloads stream through an MD5 hasher and an archive extractor at the
//! same time. Content is staged next to its target and only renamed into
//! place after the checksum matched and the archive was complete.
//!
//! ## Content Tree Layout
//!
//! ```text
//! <install_root>/
//! └── <catalog id>/
//!     ├── catalog.xml
//!     ├── .timestamp
//!     ├── _disabled_            (optional)
//!     └── <package dir>/
//!         ├── .revision
//!         └── ...package files
//! ```
//!
//! # Core Modules
//!
//! - [`registry`] - Root object: catalogs, installs, scheduling, event loop
//! - [`catalog`] - Catalog state, package metadata and the filter language
//! - [`install`] - Install records, the download pipeline and archive extraction
//! - [`metadata`] - Property-tree parsing and catalog document decoding
//! - [`version`] - Wildcard version matching
//! - [`transport`] - HTTP collaborator boundary and its reqwest implementation
//!
//! ## Supporting Modules
//!
//! - [`config`] - Registry configuration (`~/.pkgcat/config.toml`)
//! - [`core`] - Error types and the shared status enum
//! - [`constants`] - File names and defaults of the content tree
//! - [`utils`] - Filesystem helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use pkgcat::catalog::Filter;
//! use pkgcat::{Registry, RegistryConfig, ReqwestTransport};
//!
//! # async fn example() -> pkgcat::Result<()> {
//! let config = RegistryConfig::new("/var/lib/content", "3.0.2");
//! let transport = ReqwestTransport::new(&config)?;
//! let mut registry = Registry::new(config, Box::new(transport))?;
//!
//! registry.add_catalog("https://example.org/catalog.xml")?;
//! registry.run_until_idle().await;
//!
//! let filter = Filter::parse("<f><tag>helicopter</tag></f>")?;
//! for package in registry.packages_matching(&filter) {
//!     println!("{} r{}", package.qualified_id(), package.revision());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! pkgcat logs through `tracing`; install a subscriber in the host
//! application to see refresh and download activity.

// Catalogs and installs
pub mod catalog;
pub mod install;
pub mod registry;

// Documents and formats
pub mod metadata;
pub mod version;

// Infrastructure
pub mod config;
pub mod constants;
pub mod core;
pub mod transport;
pub mod utils;

// Test utilities (available in tests and with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use catalog::{Catalog, Filter, Package};
pub use config::RegistryConfig;
pub use core::{PkgError, Result, Status};
pub use install::{Install, InstallOutcome};
pub use registry::{Registry, RegistryDelegate};
pub use transport::{HttpTransport, ReqwestTransport};
