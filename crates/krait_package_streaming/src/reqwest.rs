//! Downloading of package archives over HTTP.

use std::path::Path;

use futures::StreamExt;
use krait_digest::{Md5, Md5Hash, Sha256, Sha256Hash};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::{ExtractError, ExtractResult};

/// What a downloaded archive is validated against. SHA256 is preferred when
/// both hashes are known.
#[derive(Debug, Clone, Default)]
pub struct DownloadValidation {
    /// The expected size of the archive in bytes.
    pub size: Option<u64>,

    /// The expected SHA256 hash of the archive.
    pub sha256: Option<Sha256Hash>,

    /// The expected MD5 hash of the archive.
    pub md5: Option<Md5Hash>,
}

/// Downloads the archive at `url` to `destination`, validating size and
/// digest along the way.
///
/// The data is staged in a sibling temporary file and only renamed to the
/// destination after validation succeeds, so a failed or corrupt download
/// never leaves a partial archive behind.
pub async fn download(
    client: &reqwest::Client,
    url: Url,
    destination: &Path,
    validation: &DownloadValidation,
) -> Result<ExtractResult, ExtractError> {
    tracing::debug!("downloading {} to {}", url, destination.display());

    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(ExtractError::DownloadFailed)?;

    let parent = destination
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no parent directory"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(ExtractError::CouldNotCreateDestination)?;

    let staging = tempfile::NamedTempFile::new_in(parent)?;
    let mut file = tokio::fs::File::create(staging.path()).await?;

    let mut sha256 = <Sha256 as krait_digest::digest::Digest>::new();
    let mut md5 = <Md5 as krait_digest::digest::Digest>::new();
    let mut total: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ExtractError::DownloadFailed)?;
        krait_digest::digest::Digest::update(&mut sha256, &chunk);
        krait_digest::digest::Digest::update(&mut md5, &chunk);
        total += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let result = ExtractResult {
        sha256: krait_digest::digest::Digest::finalize(sha256),
        md5: krait_digest::digest::Digest::finalize(md5),
    };

    validate(validation, total, &result)?;

    // The file only reaches its final name after passing validation.
    staging.persist(destination).map_err(|e| e.error)?;
    Ok(result)
}

/// Checks the downloaded bytes against the recorded size and digests.
/// SHA256 wins over MD5 when both are present.
pub fn validate(
    validation: &DownloadValidation,
    actual_size: u64,
    actual: &ExtractResult,
) -> Result<(), ExtractError> {
    if let Some(expected) = validation.size {
        if expected != actual_size {
            return Err(ExtractError::SizeMismatch {
                expected,
                actual: actual_size,
            });
        }
    }

    if let Some(expected) = &validation.sha256 {
        if expected != &actual.sha256 {
            return Err(ExtractError::HashMismatch {
                expected: format!("{expected:x}"),
                actual: format!("{:x}", actual.sha256),
            });
        }
    } else if let Some(expected) = &validation.md5 {
        if expected != &actual.md5 {
            return Err(ExtractError::HashMismatch {
                expected: format!("{expected:x}"),
                actual: format!("{:x}", actual.md5),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::{validate, DownloadValidation};
    use crate::ExtractResult;
    use assert_matches::assert_matches;
    use krait_digest::compute_bytes_digest;

    fn result_for(bytes: &[u8]) -> ExtractResult {
        ExtractResult {
            sha256: compute_bytes_digest::<krait_digest::Sha256>(bytes),
            md5: compute_bytes_digest::<krait_digest::Md5>(bytes),
        }
    }

    #[test]
    fn size_mismatch() {
        let result = result_for(b"0123456789");
        let validation = DownloadValidation {
            size: Some(9),
            ..Default::default()
        };
        assert_matches!(
            validate(&validation, 10, &result),
            Err(crate::ExtractError::SizeMismatch {
                expected: 9,
                actual: 10
            })
        );
    }

    #[test]
    fn sha256_mismatch() {
        let result = result_for(b"data");
        let validation = DownloadValidation {
            sha256: Some(compute_bytes_digest::<krait_digest::Sha256>(b"other")),
            ..Default::default()
        };
        assert_matches!(
            validate(&validation, 4, &result),
            Err(crate::ExtractError::HashMismatch { .. })
        );
    }

    #[test]
    fn sha256_preferred_over_md5() {
        let result = result_for(b"data");
        // A wrong md5 is ignored when a correct sha256 is present.
        let validation = DownloadValidation {
            sha256: Some(result.sha256),
            md5: Some(compute_bytes_digest::<krait_digest::Md5>(b"other")),
            ..Default::default()
        };
        validate(&validation, 4, &result).unwrap();
    }

    #[test]
    fn md5_checked_when_no_sha256() {
        let result = result_for(b"data");
        let validation = DownloadValidation {
            md5: Some(compute_bytes_digest::<krait_digest::Md5>(b"other")),
            ..Default::default()
        };
        assert_matches!(
            validate(&validation, 4, &result),
            Err(crate::ExtractError::HashMismatch { .. })
        );
    }

    #[test]
    fn all_valid() {
        let result = result_for(b"data");
        let validation = DownloadValidation {
            size: Some(4),
            sha256: Some(result.sha256),
            md5: Some(result.md5),
        };
        validate(&validation, 4, &result).unwrap();
    }
}
