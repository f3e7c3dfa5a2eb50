//! Integration test suite for pkgcat
//!
//! These tests drive a real [`Registry`](pkgcat::Registry) over a temporary
//! install root. Most use the scripted `MockTransport`; `http_transport`
//! runs against a local HTTP server through `ReqwestTransport`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **catalog_refresh**: Refresh outcomes, version gating, orphans, persistence
//! - **migration**: Alternate catalogs and migration of installed packages
//! - **install_pipeline**: Download, checksum, extraction, publish, mirrors
//! - **scheduling**: Dependencies, concurrency ceiling, cancel, updates
//! - **filters**: Package queries through the filter language
//! - **http_transport**: End to end over HTTP

#[path = "../common/mod.rs"]
mod common;

mod catalog_refresh;
mod filters;
mod http_transport;
mod install_pipeline;
mod migration;
mod scheduling;
