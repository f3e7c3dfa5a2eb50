//! Common test utilities for pkgcat integration tests
//!
//! [`TestRegistry`] bundles a temporary install root, a scripted transport
//! and a registry wired to both.

// Not every helper is used by every test file
#![allow(dead_code)]

use anyhow::{Context, Result};
use pkgcat::test_utils::{
    CatalogXml, MockResponse, MockTransport, RecordingDelegate, init_test_logging,
};
use pkgcat::{Registry, RegistryConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const APP_VERSION: &str = "3.0.2";
pub const CATALOG_URL: &str = "https://catalogs.example.org/main/catalog.xml";

/// A registry over a temporary install root and a [`MockTransport`].
pub struct TestRegistry {
    pub temp: TempDir,
    pub transport: MockTransport,
    pub delegate: RecordingDelegate,
    pub registry: Registry,
}

impl TestRegistry {
    pub fn new() -> Result<Self> {
        Self::with_config(|_| {})
    }

    /// Builds the registry after `adjust` has edited the default config.
    pub fn with_config(adjust: impl FnOnce(&mut RegistryConfig)) -> Result<Self> {
        init_test_logging(None);
        let temp = TempDir::new().context("create install root")?;
        let transport = MockTransport::new();
        let delegate = RecordingDelegate::new();

        let mut config = RegistryConfig::new(temp.path(), APP_VERSION);
        adjust(&mut config);
        let mut registry = Registry::new(config, transport.boxed())?;
        registry.add_delegate(Box::new(delegate.clone()));
        registry.seed_mirror_selection(42);

        Ok(Self {
            temp,
            transport,
            delegate,
            registry,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Serves `catalog` at `url`.
    pub fn serve_catalog(&self, url: &str, catalog: &CatalogXml) {
        self.transport.route(url, MockResponse::ok(catalog.build()));
    }

    /// Serves `archive` at every URL in `urls`.
    pub fn serve_archive(&self, urls: &[&str], archive: &[u8]) {
        for url in urls {
            self.transport.route(url, MockResponse::ok(archive.to_vec()));
        }
    }

    /// Serves `catalog` at [`CATALOG_URL`], adds it and runs the refresh.
    pub fn add_main_catalog(&mut self, catalog: &CatalogXml) -> Result<()> {
        self.serve_catalog(CATALOG_URL, catalog);
        self.registry.add_catalog(CATALOG_URL)?;
        self.registry.poll();
        Ok(())
    }

    /// Opens a second registry on the same install root.
    pub fn reopen(&self) -> Result<Registry> {
        let config = RegistryConfig::new(self.temp.path(), APP_VERSION);
        Ok(Registry::new(config, self.transport.boxed())?)
    }

    /// Installs `id` and drives the registry until idle.
    pub fn install_now(&mut self, id: &str) -> Result<PathBuf> {
        let path = self.registry.install(id)?;
        self.registry.poll();
        Ok(path)
    }
}

/// Content of the `.revision` file in `dir`.
pub fn read_revision(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(".revision")).ok()
}

/// Names of the entries directly inside `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
