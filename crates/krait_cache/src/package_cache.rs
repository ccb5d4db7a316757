//! The [`PackageCache`] itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use krait_conda_types::package::ArchiveIdentifier;
use krait_conda_types::RepoDataRecord;
use krait_digest::{compute_file_digest, Md5, Sha256};
use krait_package_streaming::reqwest::{download, DownloadValidation};
use krait_package_streaming::ExtractError;
use url::Url;

use crate::validation::{validate_package_directory, PackageValidationError};

/// The number of times a trashed entry is attempted to be deleted, with the
/// pause doubling each round (0.1s + 0.2s + ... ≈ 6.3s in total).
const DELETE_TRIES: u32 = 7;
const DELETE_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// What the cache currently holds for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    /// Nothing is cached.
    None,
    /// Only the archive is present.
    TarballOnly(PathBuf),
    /// Only the extracted tree is present.
    ExtractedOnly(PathBuf),
    /// Both the archive and the extracted tree are present.
    Both {
        /// The path of the archive.
        tarball: PathBuf,
        /// The path of the extracted tree.
        dir: PathBuf,
    },
}

/// An error from a package cache operation.
#[derive(Debug, thiserror::Error)]
pub enum PackageCacheError {
    /// An IO error occurred.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Fetching or extracting the archive failed.
    #[error(transparent)]
    ExtractError(#[from] ExtractError),

    /// The per-entry lock could not be acquired.
    #[error("failed to acquire lock for cache entry: {0}")]
    LockError(String),

    /// None of the configured cache directories is writable.
    #[error("none of the package cache directories is writable")]
    NoWritableCacheDirectory,

    /// The record carries no download url and is not cached.
    #[error("package '{0}' is not cached and has no download url")]
    NotCached(String),

    /// A cached entry failed verification.
    #[error("cache entry '{0}' failed verification")]
    ValidationFailed(String, #[source] PackageValidationError),
}

/// A cache of extracted packages and their archives, possibly layered over
/// several directories. Reads fall through the layers in order; all writes
/// go to the first writable layer.
#[derive(Debug, Clone)]
pub struct PackageCache {
    layers: Vec<PathBuf>,
}

impl PackageCache {
    /// Constructs a cache with a single directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::new_layered(std::iter::once(path.into()))
    }

    /// Constructs a cache over several directories, queried in order.
    pub fn new_layered<I>(paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        Self {
            layers: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the directories backing this cache.
    pub fn layers(&self) -> &[PathBuf] {
        &self.layers
    }

    /// Returns the first writable cache directory, creating it if necessary.
    pub fn writable_layer(&self) -> Result<&Path, PackageCacheError> {
        for layer in &self.layers {
            if !layer.exists() && fs_err::create_dir_all(layer).is_err() {
                continue;
            }
            let writable = !layer
                .metadata()
                .map(|m| m.permissions().readonly())
                .unwrap_or(true);
            if writable {
                return Ok(layer);
            }
        }
        Err(PackageCacheError::NoWritableCacheDirectory)
    }

    /// Reports what the cache holds for the given package.
    pub fn locate(&self, id: &ArchiveIdentifier) -> CacheLocation {
        let mut tarball = None;
        let mut dir = None;

        for layer in &self.layers {
            if tarball.is_none() {
                let candidate = layer.join(id.to_file_name());
                if candidate.is_file() {
                    tarball = Some(candidate);
                }
            }
            if dir.is_none() {
                let candidate = layer.join(id.dist_str());
                // `info/index.json` is the completion sentinel: an extracted
                // tree without it is a leftover partial extract.
                if candidate.join("info/index.json").is_file() {
                    dir = Some(candidate);
                }
            }
        }

        match (tarball, dir) {
            (None, None) => CacheLocation::None,
            (Some(tarball), None) => CacheLocation::TarballOnly(tarball),
            (None, Some(dir)) => CacheLocation::ExtractedOnly(dir),
            (Some(tarball), Some(dir)) => CacheLocation::Both { tarball, dir },
        }
    }

    /// Returns the extracted directory for the record, downloading and
    /// extracting as needed. Writers for the same entry are serialized via a
    /// lock file; completed entries are returned without locking.
    pub async fn ensure_extracted(
        &self,
        record: &RepoDataRecord,
        client: &reqwest::Client,
    ) -> Result<PathBuf, PackageCacheError> {
        let id = archive_identifier(record);

        // Fast path: a completed entry requires no lock.
        if let CacheLocation::ExtractedOnly(dir) | CacheLocation::Both { dir, .. } =
            self.locate(&id)
        {
            return Ok(dir);
        }

        let writable = self.writable_layer()?.to_path_buf();
        let _lock = EntryLock::acquire(&writable, &id.dist_str())?;

        // Re-check under the lock: another process may have completed the
        // entry while we were waiting.
        if let CacheLocation::ExtractedOnly(dir) | CacheLocation::Both { dir, .. } =
            self.locate(&id)
        {
            return Ok(dir);
        }

        let tarball = match self.locate(&id) {
            CacheLocation::TarballOnly(tarball) | CacheLocation::Both { tarball, .. } => tarball,
            _ => {
                let destination = writable.join(id.to_file_name());
                self.fetch_tarball(record, &destination, client).await?;
                destination
            }
        };

        self.extract_tarball(&tarball, &writable, &id)
    }

    /// Downloads the archive of a record, validating size and digests. On
    /// failure nothing is left in the cache.
    async fn fetch_tarball(
        &self,
        record: &RepoDataRecord,
        destination: &Path,
        client: &reqwest::Client,
    ) -> Result<(), PackageCacheError> {
        let url: &Url = &record.url;
        let validation = DownloadValidation {
            size: record.package_record.size,
            sha256: record.package_record.sha256,
            md5: record.package_record.md5,
        };
        download(client, url.clone(), destination, &validation).await?;
        Ok(())
    }

    /// Extracts a tarball into the writable layer. The archive is unpacked
    /// into a staging directory first and renamed into place afterwards, so
    /// a valid-looking entry is always complete.
    fn extract_tarball(
        &self,
        tarball: &Path,
        writable: &Path,
        id: &ArchiveIdentifier,
    ) -> Result<PathBuf, PackageCacheError> {
        let destination = writable.join(id.dist_str());
        let staging = writable.join(format!(
            "{}.extracting-{}",
            id.dist_str(),
            uuid::Uuid::new_v4().simple()
        ));

        let result = krait_package_streaming::fs::extract(tarball, &staging);
        match result {
            Ok(_) => {}
            Err(e) => {
                let _ = fs_err::remove_dir_all(&staging);
                return Err(e.into());
            }
        }

        // A leftover invalid entry is trashed before the rename.
        if destination.exists() {
            self.trash_and_delete(&destination)?;
        }
        fs_err::rename(&staging, &destination)?;
        Ok(destination)
    }

    /// Removes the extracted tree and the archive of a package from the
    /// cache. Entries are moved into `.trash/` first so that deletion
    /// failures on hostile filesystems never leave half-deleted entries in
    /// the cache proper.
    pub fn remove(&self, id: &ArchiveIdentifier) -> Result<(), PackageCacheError> {
        for layer in &self.layers {
            let dir = layer.join(id.dist_str());
            if dir.exists() {
                self.trash_and_delete(&dir)?;
            }
            let tarball = layer.join(id.to_file_name());
            if tarball.exists() {
                self.trash_and_delete(&tarball)?;
            }
        }
        Ok(())
    }

    /// Verifies a cached record: the archive digests against the record, and
    /// every extracted file against the package's own `paths.json`.
    pub fn verify(&self, record: &RepoDataRecord) -> Result<(), PackageCacheError> {
        let id = archive_identifier(record);

        match self.locate(&id) {
            CacheLocation::None => {
                return Err(PackageCacheError::NotCached(id.dist_str()));
            }
            CacheLocation::TarballOnly(tarball) => {
                self.verify_tarball(record, &tarball)?;
            }
            CacheLocation::ExtractedOnly(dir) => {
                self.verify_extracted(&id, &dir)?;
            }
            CacheLocation::Both { tarball, dir } => {
                self.verify_tarball(record, &tarball)?;
                self.verify_extracted(&id, &dir)?;
            }
        }
        Ok(())
    }

    fn verify_tarball(
        &self,
        record: &RepoDataRecord,
        tarball: &Path,
    ) -> Result<(), PackageCacheError> {
        if let Some(expected) = &record.package_record.sha256 {
            let actual = compute_file_digest::<Sha256>(tarball)?;
            if &actual != expected {
                return Err(ExtractError::HashMismatch {
                    expected: format!("{expected:x}"),
                    actual: format!("{actual:x}"),
                }
                .into());
            }
        } else if let Some(expected) = &record.package_record.md5 {
            let actual = compute_file_digest::<Md5>(tarball)?;
            if &actual != expected {
                return Err(ExtractError::HashMismatch {
                    expected: format!("{expected:x}"),
                    actual: format!("{actual:x}"),
                }
                .into());
            }
        }
        Ok(())
    }

    fn verify_extracted(
        &self,
        id: &ArchiveIdentifier,
        dir: &Path,
    ) -> Result<(), PackageCacheError> {
        validate_package_directory(dir)
            .map(|_| ())
            .map_err(|e| PackageCacheError::ValidationFailed(id.dist_str(), e))
    }

    /// Moves a path into the `.trash` directory of its layer and then tries
    /// to delete it, backing off and retrying when the filesystem refuses.
    fn trash_and_delete(&self, path: &Path) -> Result<(), PackageCacheError> {
        let layer = path.parent().expect("cache entries always have a parent");
        let trash_dir = layer.join(".trash");
        fs_err::create_dir_all(&trash_dir)?;

        let trashed = trash_dir.join(uuid::Uuid::new_v4().simple().to_string());
        fs_err::rename(path, &trashed)?;

        let mut backoff = DELETE_INITIAL_BACKOFF;
        for attempt in 0..DELETE_TRIES {
            let result = if trashed.is_dir() {
                fs_err::remove_dir_all(&trashed)
            } else {
                fs_err::remove_file(&trashed)
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    // The entry is out of the way already; deletion is best
                    // effort and a later `clean_trash` sweeps up leftovers.
                    if attempt + 1 == DELETE_TRIES {
                        tracing::warn!(
                            "could not delete '{}' after {DELETE_TRIES} attempts: {e}",
                            trashed.display()
                        );
                        return Ok(());
                    }
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }
        Ok(())
    }

    /// Deletes everything that is still pending in the trash directories.
    pub fn clean_trash(&self) -> Result<(), PackageCacheError> {
        for layer in &self.layers {
            let trash_dir = layer.join(".trash");
            if !trash_dir.exists() {
                continue;
            }
            let mut all_removed = true;
            for entry in fs_err::read_dir(&trash_dir)? {
                let entry = entry?;
                let result = if entry.file_type()?.is_dir() {
                    fs_err::remove_dir_all(entry.path())
                } else {
                    fs_err::remove_file(entry.path())
                };
                if result.is_err() {
                    all_removed = false;
                }
            }
            if all_removed {
                let _ = fs_err::remove_dir(&trash_dir);
            }
        }
        Ok(())
    }
}

/// A lock file serializing writers of one cache entry.
struct EntryLock {
    _lock: fslock::LockFile,
    path: PathBuf,
}

impl EntryLock {
    fn acquire(layer: &Path, dist: &str) -> Result<Self, PackageCacheError> {
        let path = layer.join(format!("{dist}.lock"));
        let mut lock = fslock::LockFile::open(path.as_os_str())
            .map_err(|e| PackageCacheError::LockError(format!("{dist}: {e}")))?;
        lock.lock()
            .map_err(|e| PackageCacheError::LockError(format!("{dist}: {e}")))?;
        Ok(Self { _lock: lock, path })
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        let _ = fs_err::remove_file(&self.path);
    }
}

fn archive_identifier(record: &RepoDataRecord) -> ArchiveIdentifier {
    ArchiveIdentifier::try_from_filename(&record.file_name).unwrap_or_else(|| {
        // Repodata filenames are always well-formed; records built by hand
        // may not be, fall back to the record fields.
        ArchiveIdentifier {
            name: record.package_record.name.as_normalized().to_owned(),
            version: record.package_record.version.to_string(),
            build_string: record.package_record.build.clone(),
            archive_type: krait_conda_types::package::ArchiveType::TarBz2,
        }
    })
}

#[cfg(test)]
mod test {
    use super::{CacheLocation, PackageCache};
    use krait_conda_types::package::ArchiveIdentifier;
    use std::io::Write;

    fn dummy_id() -> ArchiveIdentifier {
        ArchiveIdentifier::try_from_filename("dummy-1.0-0.tar.bz2").unwrap()
    }

    /// Builds a valid `.tar.bz2` archive for the dummy package.
    fn dummy_archive() -> Vec<u8> {
        let mut tarball = tar::Builder::new(Vec::new());
        for (path, contents) in [
            (
                "info/index.json",
                &br#"{"build": "0", "build_number": 0, "name": "dummy", "subdir": "linux-64", "version": "1.0"}"#[..],
            ),
            ("bin/tool", b"#!/bin/sh\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tarball.append_data(&mut header, path, contents).unwrap();
        }
        let data = tarball.into_inner().unwrap();
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(&data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn locate_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        assert_eq!(cache.locate(&dummy_id()), CacheLocation::None);
    }

    #[test]
    fn locate_tarball_and_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let id = dummy_id();

        std::fs::write(dir.path().join(id.to_file_name()), dummy_archive()).unwrap();
        assert!(matches!(
            cache.locate(&id),
            CacheLocation::TarballOnly(_)
        ));

        // A directory without the sentinel does not count as extracted.
        std::fs::create_dir_all(dir.path().join(id.dist_str()).join("bin")).unwrap();
        assert!(matches!(cache.locate(&id), CacheLocation::TarballOnly(_)));

        std::fs::create_dir_all(dir.path().join(id.dist_str()).join("info")).unwrap();
        std::fs::write(
            dir.path().join(id.dist_str()).join("info/index.json"),
            "{}",
        )
        .unwrap();
        assert!(matches!(cache.locate(&id), CacheLocation::Both { .. }));
    }

    #[test]
    fn extract_from_cached_tarball() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let id = dummy_id();
        let tarball_path = dir.path().join(id.to_file_name());
        std::fs::write(&tarball_path, dummy_archive()).unwrap();

        let extracted = cache
            .extract_tarball(&tarball_path, dir.path(), &id)
            .unwrap();
        assert!(extracted.join("info/index.json").is_file());
        assert!(extracted.join("bin/tool").is_file());
        assert!(matches!(cache.locate(&id), CacheLocation::Both { .. }));
    }

    #[test]
    fn remove_moves_to_trash() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let id = dummy_id();
        let tarball_path = dir.path().join(id.to_file_name());
        std::fs::write(&tarball_path, dummy_archive()).unwrap();
        cache
            .extract_tarball(&tarball_path, dir.path(), &id)
            .unwrap();

        cache.remove(&id).unwrap();
        assert_eq!(cache.locate(&id), CacheLocation::None);

        cache.clean_trash().unwrap();
        assert!(!dir.path().join(".trash").exists());
    }

    #[test]
    fn layered_reads_fall_through() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let id = dummy_id();

        // Populate only the second layer.
        let extracted = second.path().join(id.dist_str());
        std::fs::create_dir_all(extracted.join("info")).unwrap();
        std::fs::write(extracted.join("info/index.json"), "{}").unwrap();

        let cache = PackageCache::new_layered([first.path(), second.path()]);
        assert!(matches!(cache.locate(&id), CacheLocation::ExtractedOnly(_)));
        assert_eq!(cache.writable_layer().unwrap(), first.path());
    }
}
