//! Validation of extracted package directories against their `paths.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use krait_conda_types::package::{IndexJson, PackageFile, PathType, PathsEntry, PathsJson};
use krait_digest::{compute_file_digest, Sha256};

/// An error returned when the contents of an extracted package directory do
/// not match its metadata.
#[derive(Debug, thiserror::Error)]
pub enum PackageValidationError {
    /// Neither a `paths.json` nor the deprecated metadata files exist.
    #[error("neither a 'paths.json' nor a deprecated 'files' file was found")]
    MetadataMissing,

    /// The `index.json` could not be read.
    #[error("failed to read 'index.json'")]
    ReadIndexJsonError(#[source] std::io::Error),

    /// The `paths.json` could not be read.
    #[error("failed to read 'paths.json'")]
    ReadPathsJsonError(#[source] std::io::Error),

    /// An entry of the package is corrupted.
    #[error("the path '{0}' seems to be corrupted")]
    CorruptedEntry(PathBuf, #[source] PackageEntryValidationError),
}

/// The reason a specific file failed validation.
#[derive(Debug, thiserror::Error)]
pub enum PackageEntryValidationError {
    /// The file does not exist.
    #[error("the file does not exist")]
    NotFound,

    /// Expected a symbolic link.
    #[error("expected a symbolic link")]
    ExpectedSymlink,

    /// Expected a directory.
    #[error("expected a directory")]
    ExpectedDirectory,

    /// The size of the file does not match.
    #[error("incorrect size, expected {0} but the file on disk is {1}")]
    IncorrectSize(u64, u64),

    /// The SHA256 hash of the file does not match.
    #[error("sha256 mismatch, expected '{0}' but the file on disk is '{1}'")]
    HashMismatch(String, String),

    /// An IO error occurred while validating.
    #[error("an io error occurred")]
    IoError(#[from] std::io::Error),
}

/// Validates that the extracted package at `package_dir` matches its own
/// metadata. Returns the parsed `index.json` and `paths.json` on success.
pub fn validate_package_directory(
    package_dir: &Path,
) -> Result<(IndexJson, PathsJson), PackageValidationError> {
    let index_json = IndexJson::from_package_directory(package_dir)
        .map_err(PackageValidationError::ReadIndexJsonError)?;

    let paths = match PathsJson::from_package_directory_with_deprecated_fallback(package_dir) {
        Ok(paths) => paths,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PackageValidationError::MetadataMissing)
        }
        Err(e) => return Err(PackageValidationError::ReadPathsJsonError(e)),
    };

    validate_package_directory_from_paths(package_dir, &paths)
        .map_err(|(path, err)| PackageValidationError::CorruptedEntry(path, err))?;

    Ok((index_json, paths))
}

/// Validates every entry of a `paths.json` against the files on disk.
pub fn validate_package_directory_from_paths(
    package_dir: &Path,
    paths: &PathsJson,
) -> Result<(), (PathBuf, PackageEntryValidationError)> {
    for entry in &paths.paths {
        validate_package_entry(package_dir, entry)
            .map_err(|e| (entry.relative_path.clone(), e))?;
    }
    Ok(())
}

/// Validates a single `paths.json` entry.
pub fn validate_package_entry(
    package_dir: &Path,
    entry: &PathsEntry,
) -> Result<(), PackageEntryValidationError> {
    let path = package_dir.join(&entry.relative_path);

    match entry.path_type {
        PathType::HardLink => validate_file(&path, entry),
        PathType::SoftLink => {
            if path.is_symlink() {
                Ok(())
            } else {
                Err(PackageEntryValidationError::ExpectedSymlink)
            }
        }
        PathType::Directory => {
            if path.is_dir() {
                Ok(())
            } else {
                Err(PackageEntryValidationError::ExpectedDirectory)
            }
        }
    }
}

fn validate_file(path: &Path, entry: &PathsEntry) -> Result<(), PackageEntryValidationError> {
    let metadata = match path.symlink_metadata() {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PackageEntryValidationError::NotFound)
        }
        Err(e) => return Err(PackageEntryValidationError::IoError(e)),
    };

    if let Some(expected_size) = entry.size_in_bytes {
        if metadata.len() != expected_size {
            return Err(PackageEntryValidationError::IncorrectSize(
                expected_size,
                metadata.len(),
            ));
        }
    }

    if let Some(expected_hash) = &entry.sha256 {
        let actual = compute_file_digest::<Sha256>(path)?;
        if &actual != expected_hash {
            return Err(PackageEntryValidationError::HashMismatch(
                format!("{expected_hash:x}"),
                format!("{actual:x}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::{validate_package_directory, PackageEntryValidationError, PackageValidationError};
    use assert_matches::assert_matches;
    use krait_digest::compute_bytes_digest;

    fn write_package(dir: &std::path::Path, file_contents: &[u8], recorded_sha_of: &[u8]) {
        let info = dir.join("info");
        std::fs::create_dir_all(&info).unwrap();
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        std::fs::write(dir.join("bin/tool"), file_contents).unwrap();

        std::fs::write(
            info.join("index.json"),
            r#"{"build": "0", "build_number": 0, "name": "dummy", "subdir": "linux-64", "version": "1.0"}"#,
        )
        .unwrap();

        let sha = compute_bytes_digest::<krait_digest::Sha256>(recorded_sha_of);
        std::fs::write(
            info.join("paths.json"),
            format!(
                r#"{{"paths_version": 1, "paths": [{{"_path": "bin/tool", "path_type": "hardlink", "sha256": "{sha:x}", "size_in_bytes": {}}}]}}"#,
                recorded_sha_of.len()
            ),
        )
        .unwrap();
    }

    #[test]
    fn valid_package() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), b"contents", b"contents");
        let (index, paths) = validate_package_directory(dir.path()).unwrap();
        assert_eq!(index.name.as_normalized(), "dummy");
        assert_eq!(paths.paths.len(), 1);
    }

    #[test]
    fn hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), b"altered!", b"contents");
        assert_matches!(
            validate_package_directory(dir.path()),
            Err(PackageValidationError::CorruptedEntry(
                _,
                PackageEntryValidationError::HashMismatch(..)
            ))
        );
    }

    #[test]
    fn size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), b"too long contents", b"contents");
        assert_matches!(
            validate_package_directory(dir.path()),
            Err(PackageValidationError::CorruptedEntry(
                _,
                PackageEntryValidationError::IncorrectSize(..)
            ))
        );
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), b"contents", b"contents");
        std::fs::remove_file(dir.path().join("bin/tool")).unwrap();
        assert_matches!(
            validate_package_directory(dir.path()),
            Err(PackageValidationError::CorruptedEntry(
                _,
                PackageEntryValidationError::NotFound
            ))
        );
    }
}
