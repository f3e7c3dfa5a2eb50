//! Delivery status shared by catalogs and installs.
//!
//! Every asynchronous operation in pkgcat terminates by storing one of these
//! values and notifying observers; none of them is ever returned as an `Err`.
//! Not every value applies to both catalogs and installs:
//!
//! | Status | Catalog | Install |
//! |---|---|---|
//! | `InProgress` | refresh in flight | download in flight |
//! | `Success` | loaded from local cache | installed |
//! | `Refreshed` | fetched from the network | - |
//! | `UserDisabled` | disabled marker present | - |
//! | `UserCancelled` | - | download cancelled |
//! | `FailNotFound` | HTTP 404 | HTTP 404 on every mirror |
//! | `FailDownload` | transport failure | transport failure on every mirror |
//! | `FailExtract` | document does not parse | archive broken or truncated |
//! | `FailChecksum` | - | MD5 mismatch on every mirror |
//! | `FailValidation` | a package entry is invalid | - |
//! | `FailVersion` | no compatible version | - |
//! | `FailFilesystem` | cache could not be written | publish rename failed |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a catalog refresh or an install download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The operation has been started and has not terminated yet.
    InProgress,
    /// Terminated successfully without a network fetch (catalogs) or with
    /// the content published (installs).
    Success,
    /// A catalog document was fetched from the network and accepted.
    Refreshed,
    /// The user disabled the catalog.
    UserDisabled,
    /// The user cancelled the download.
    UserCancelled,
    /// The server reported that the resource does not exist.
    FailNotFound,
    /// The transfer failed or the server answered with a non-200 status.
    FailDownload,
    /// The payload could not be parsed or extracted.
    FailExtract,
    /// The payload hash does not equal the declared MD5.
    FailChecksum,
    /// The catalog document declares invalid package entries.
    FailValidation,
    /// The catalog is not compatible with the running application version.
    FailVersion,
    /// A local filesystem operation failed.
    FailFilesystem,
    /// Anything not covered above.
    FailUnknown,
}

impl Status {
    /// Returns true for every `Fail*` value.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::FailNotFound
                | Self::FailDownload
                | Self::FailExtract
                | Self::FailChecksum
                | Self::FailValidation
                | Self::FailVersion
                | Self::FailFilesystem
                | Self::FailUnknown
        )
    }

    /// Failures that an install retries on the next mirror.
    ///
    /// Extraction, filesystem and validation failures point at broken content
    /// or a broken local environment and are never retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::FailNotFound | Self::FailDownload | Self::FailChecksum)
    }

    /// Returns true once the operation has terminated, either way.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Stable upper-case name, as used in logs and serialized state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Refreshed => "REFRESHED",
            Self::UserDisabled => "USER_DISABLED",
            Self::UserCancelled => "USER_CANCELLED",
            Self::FailNotFound => "FAIL_NOT_FOUND",
            Self::FailDownload => "FAIL_DOWNLOAD",
            Self::FailExtract => "FAIL_EXTRACT",
            Self::FailChecksum => "FAIL_CHECKSUM",
            Self::FailValidation => "FAIL_VALIDATION",
            Self::FailVersion => "FAIL_VERSION",
            Self::FailFilesystem => "FAIL_FILESYSTEM",
            Self::FailUnknown => "FAIL_UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
