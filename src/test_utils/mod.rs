//! Test utilities for pkgcat
//!
//! This module provides what the unit and integration tests share:
//! - [`MockTransport`], a scripted [`HttpTransport`](crate::transport::HttpTransport)
//! - Builders for catalog documents ([`CatalogXml`], [`PackageXml`])
//! - Archive helpers producing real tar, tar.gz and zip bytes
//! - [`RecordingDelegate`], which captures registry notifications
//!
//! # Example
//!
//! ```rust,no_run
//! use pkgcat::test_utils::{CatalogXml, MockResponse, MockTransport, PackageXml};
//!
//! let transport = MockTransport::new();
//! let xml = CatalogXml::new("main")
//!     .version("3.0.*")
//!     .package(PackageXml::new("c172").revision(2))
//!     .build();
//! transport.route("https://example.org/catalog.xml", MockResponse::ok(xml));
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::{CatalogXml, PackageXml, md5_hex, plain_tar, tar_gz, zip_archive};
pub use mock::{MockResponse, MockTransport, RecordingDelegate, RegistryEvent};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `None`, logging is enabled only
/// when `RUST_LOG` is set.
///
/// ```bash
/// RUST_LOG=pkgcat=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
