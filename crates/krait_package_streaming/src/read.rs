//! Extraction of archives from anything that implements [`std::io::Read`].

use std::io::Read;
use std::path::Path;

use krait_digest::{HashingReader, Md5, Sha256};

use crate::{ExtractError, ExtractResult};

/// Returns the `.tar.bz2` stream as a decompressed [`tar::Archive`] which
/// can be used to extract or inspect the contents.
pub fn stream_tar_bz2(reader: impl Read) -> tar::Archive<impl Read + Sized> {
    tar::Archive::new(bzip2::read::BzDecoder::new(reader))
}

/// Extracts the contents of a `.tar.bz2` archive to the destination
/// directory, returning the hashes of the (compressed) archive bytes.
pub fn extract_tar_bz2(
    reader: impl Read,
    destination: &Path,
) -> Result<ExtractResult, ExtractError> {
    std::fs::create_dir_all(destination).map_err(ExtractError::CouldNotCreateDestination)?;

    // Hash the raw archive bytes while the tar layer consumes them.
    let sha256_reader = HashingReader::<_, Sha256>::new(reader);
    let mut md5_reader = HashingReader::<_, Md5>::new(sha256_reader);

    stream_tar_bz2(&mut md5_reader).unpack(destination)?;

    // Drain whatever trailing bytes the tar reader left unconsumed so the
    // digests cover the whole file.
    std::io::copy(&mut md5_reader, &mut std::io::sink())?;

    let (sha256_reader, md5) = md5_reader.finalize();
    let (_, sha256) = sha256_reader.finalize();

    Ok(ExtractResult { sha256, md5 })
}

#[cfg(test)]
mod test {
    use super::extract_tar_bz2;
    use crate::test_util::build_archive;
    use krait_digest::compute_bytes_digest;

    #[test]
    fn extract_and_hash() {
        let archive = build_archive(&[
            ("info/index.json", br#"{"name": "dummy"}"#),
            ("bin/tool", b"#!/bin/sh\necho tool\n"),
        ]);

        let destination = tempfile::tempdir().unwrap();
        let result = extract_tar_bz2(archive.as_slice(), destination.path()).unwrap();

        assert!(destination.path().join("info/index.json").is_file());
        assert!(destination.path().join("bin/tool").is_file());
        assert_eq!(
            result.sha256,
            compute_bytes_digest::<krait_digest::Sha256>(&archive)
        );
        assert_eq!(
            result.md5,
            compute_bytes_digest::<krait_digest::Md5>(&archive)
        );
    }

    #[test]
    fn extract_is_idempotent() {
        let archive = build_archive(&[("info/index.json", br#"{"name": "dummy"}"#)]);
        let destination = tempfile::tempdir().unwrap();

        let first = extract_tar_bz2(archive.as_slice(), destination.path()).unwrap();
        let second = extract_tar_bz2(archive.as_slice(), destination.path()).unwrap();
        assert_eq!(first, second);
        assert!(destination.path().join("info/index.json").is_file());
    }

    #[test]
    fn garbage_fails() {
        let destination = tempfile::tempdir().unwrap();
        assert!(extract_tar_bz2(&b"this is not an archive"[..], destination.path()).is_err());
    }
}
