//! Extraction of package archives from the filesystem.

use std::path::Path;

use krait_conda_types::package::ArchiveType;

use crate::{read, ExtractError, ExtractResult};

/// Extracts the package archive at the given path to a directory, returning
/// the hashes of the archive file.
///
/// Only `.tar.bz2` archives are supported; any other extension fails with
/// [`ExtractError::UnsupportedArchiveType`].
pub fn extract(archive: &Path, destination: &Path) -> Result<ExtractResult, ExtractError> {
    match ArchiveType::try_from(archive.to_string_lossy().as_ref()) {
        Some(ArchiveType::TarBz2) => {
            let file = std::fs::File::open(archive)?;
            read::extract_tar_bz2(std::io::BufReader::new(file), destination)
        }
        _ => Err(ExtractError::UnsupportedArchiveType(archive.to_path_buf())),
    }
}

#[cfg(test)]
mod test {
    use super::extract;
    use crate::test_util::build_archive;
    use assert_matches::assert_matches;

    #[test]
    fn extract_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("dummy-1.0-0.tar.bz2");
        std::fs::write(
            &archive_path,
            build_archive(&[("info/index.json", br#"{"name": "dummy"}"#)]),
        )
        .unwrap();

        let destination = dir.path().join("dummy-1.0-0");
        extract(&archive_path, &destination).unwrap();
        assert!(destination.join("info/index.json").is_file());
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("dummy-1.0-0.conda");
        std::fs::write(&archive_path, b"whatever").unwrap();

        assert_matches!(
            extract(&archive_path, &dir.path().join("out")),
            Err(crate::ExtractError::UnsupportedArchiveType(_))
        );
    }
}
