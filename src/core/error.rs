//! Error handling for pkgcat
//!
//! pkgcat separates two kinds of failure:
//!
//! 1. **Asynchronous outcomes** (network failures, checksum mismatches, broken
//!    archives) are never raised as errors. They end up as a
//!    [`Status`](crate::core::Status) on the catalog or install and are
//!    delivered to callbacks and delegates.
//! 2. **Hard failures** are content or environment defects that the caller has
//!    to deal with immediately: a catalog document that does not parse, a
//!    package that fails validation, an impossible dependency graph, an unknown
//!    package, a configuration file that cannot be read. These are
//!    [`PkgError`] values returned through [`Result`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use pkgcat::core::PkgError;
//!
//! fn describe(error: &PkgError) -> &'static str {
//!     match error {
//!         PkgError::NestedDependency { .. } => "dependency graph too deep",
//!         PkgError::DependencyNotFound { .. } => "missing dependency",
//!         _ => "other failure",
//!     }
//! }
//! ```

use thiserror::Error;

/// The main error type for pkgcat operations.
///
/// Each variant names one specific failure mode and carries the identifiers
/// (package ids, paths, reasons) needed to report it.
#[derive(Error, Debug)]
pub enum PkgError {
    /// A metadata document could not be parsed.
    #[error("Invalid metadata document: {reason}")]
    InvalidDocument {
        /// What the parser rejected
        reason: String,
    },

    /// A package entry is missing a mandatory field or clashes with another entry.
    #[error("Package '{package}' is invalid: {reason}")]
    ValidationFailed {
        /// Id of the offending package (may be empty when the id itself is missing)
        package: String,
        /// Which rule was violated
        reason: String,
    },

    /// No catalog with this id or URL is registered.
    #[error("Catalog '{id}' not found")]
    CatalogNotFound {
        /// The id or URL that was looked up
        id: String,
    },

    /// No package with this id exists in any catalog.
    #[error("Package '{id}' not found")]
    PackageNotFound {
        /// The bare or qualified id that was looked up
        id: String,
    },

    /// No install is registered at this path.
    #[error("No install registered at {path}")]
    InstallNotFound {
        /// The install directory
        path: String,
    },

    /// A declared dependency is not known to any catalog.
    #[error("Dependency '{dependency}' of package '{package}' not found")]
    DependencyNotFound {
        /// Qualified id of the package declaring the dependency
        package: String,
        /// The declared dependency id
        dependency: String,
    },

    /// A declared dependency exists but its revision is too old.
    #[error(
        "Dependency '{dependency}' of package '{package}' is at revision {found}, revision {required} is required"
    )]
    DependencyTooOld {
        /// Qualified id of the package declaring the dependency
        package: String,
        /// Qualified id of the resolved dependency
        dependency: String,
        /// Minimum revision declared by the package
        required: u32,
        /// Revision the catalog currently offers
        found: u32,
    },

    /// A dependency declares dependencies of its own.
    ///
    /// Dependency graphs are limited to depth one.
    #[error("Dependency '{dependency}' of package '{package}' declares its own dependencies")]
    NestedDependency {
        /// Qualified id of the package declaring the dependency
        package: String,
        /// Qualified id of the dependency that has further dependencies
        dependency: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// A filesystem operation on the content tree failed.
    #[error("File system error during {operation}: {path}")]
    FileSystemError {
        /// What was being attempted (e.g. "create install directory")
        operation: String,
        /// The path involved
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The HTTP transport could not be constructed.
    #[error("Transport error: {message}")]
    TransportError {
        /// Description of the transport failure
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// Errors from helpers that attach context with `anyhow`
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PkgError {
    /// Builds a [`PkgError::FileSystemError`] for `path`.
    pub fn filesystem(
        operation: impl Into<String>,
        path: &std::path::Path,
        source: std::io::Error,
    ) -> Self {
        Self::FileSystemError {
            operation: operation.into(),
            path: path.display().to_string(),
            source,
        }
    }

    /// Returns true for dependency-resolution failures.
    #[must_use]
    pub const fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            Self::DependencyNotFound { .. }
                | Self::DependencyTooOld { .. }
                | Self::NestedDependency { .. }
        )
    }
}

/// Result alias used by every fallible pkgcat API.
pub type Result<T> = std::result::Result<T, PkgError>;
