#![deny(missing_docs)]

//! Extraction and download of conda package archives (`.tar.bz2`).
//!
//! The synchronous functions in [`read`] and [`fs`] extract an archive from
//! a reader or a file on disk, hashing the archive bytes as they stream by.
//! The async [`reqwest`] module downloads an archive to disk, enforcing the
//! recorded size and digests before anything is allowed to touch the
//! package cache.

pub mod fs;
pub mod read;
pub mod reqwest;

#[cfg(test)]
pub(crate) mod test_util;

use krait_digest::{Md5Hash, Sha256Hash};
use std::path::PathBuf;

/// The hashes of an archive that was extracted or downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractResult {
    /// The SHA256 hash of the archive bytes.
    pub sha256: Sha256Hash,

    /// The MD5 hash of the archive bytes.
    pub md5: Md5Hash,
}

/// An error that can occur when extracting or downloading an archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The destination directory could not be created.
    #[error("failed to create the destination directory")]
    CouldNotCreateDestination(#[source] std::io::Error),

    /// An IO error occurred while reading or unpacking the archive.
    #[error("an io error occurred")]
    IoError(#[from] std::io::Error),

    /// The archive has a format this tool does not install.
    #[error("unsupported archive type for '{0}'")]
    UnsupportedArchiveType(PathBuf),

    /// The downloaded archive does not have the expected size.
    #[error("the archive reported {actual} bytes but {expected} were expected")]
    SizeMismatch {
        /// The size recorded in the repodata.
        expected: u64,
        /// The size of the downloaded data.
        actual: u64,
    },

    /// The downloaded archive does not have the expected hash.
    #[error("the archive hash '{actual}' does not match the expected '{expected}'")]
    HashMismatch {
        /// The hex digest recorded in the repodata.
        expected: String,
        /// The hex digest of the downloaded data.
        actual: String,
    },

    /// The download itself failed.
    #[error("failed to download archive")]
    DownloadFailed(#[source] ::reqwest::Error),
}
