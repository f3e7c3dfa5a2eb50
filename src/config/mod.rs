//! Configuration management for pkgcat.
//!
//! pkgcat has a single configuration file describing the registry: the
//! content tree location, the application version used for catalog
//! compatibility negotiation, the locale, refresh and concurrency limits, and
//! transport settings. See [`RegistryConfig`] for the keys and defaults.

pub mod global;

pub use global::RegistryConfig;
