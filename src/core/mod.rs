//! Core types shared by every pkgcat module.
//!
//! - [`PkgError`] / [`Result`] for hard, synchronous failures
//! - [`Status`] for the outcome of asynchronous catalog refreshes and installs

pub mod error;
pub mod status;

pub use error::{PkgError, Result};
pub use status::Status;
