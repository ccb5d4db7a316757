//! Downloading and caching of `repodata.json` files.

use std::io::Read;
use std::path::{Path, PathBuf};

use krait_conda_types::RepoData;
use krait_digest::compute_bytes_digest;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

/// An error that can occur while fetching repodata for a subdirectory.
#[derive(Debug, thiserror::Error)]
pub enum FetchRepoDataError {
    /// The HTTP request failed.
    #[error("failed to download {0}")]
    HttpError(Url, #[source] reqwest::Error),

    /// The channel subdirectory does not exist on the server.
    #[error("{0} returned not found")]
    NotFound(Url),

    /// The repodata could not be decoded.
    #[error("failed to parse repodata from {0}")]
    InvalidRepoData(Url, #[source] serde_json::Error),

    /// The bz2 variant could not be decompressed.
    #[error("failed to decompress repodata from {0}")]
    InvalidCompression(Url, #[source] std::io::Error),

    /// A cache file could not be read or written.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// The sidecar state stored next to a cached repodata file.
#[derive(Debug, Serialize, Deserialize, Default)]
struct CacheState {
    /// The url the cached data was fetched from.
    url: String,

    /// The etag the server returned for it, used for revalidation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
}

/// Returns the path of the cached repodata for a subdir url:
/// `<cache_dir>/<hash>.json`, with the hash derived from the url.
pub fn cache_path_for_url(cache_dir: &Path, subdir_url: &Url) -> PathBuf {
    let digest = compute_bytes_digest::<krait_digest::Sha256>(subdir_url.as_str().as_bytes());
    cache_dir.join(format!("{}.json", &hex::encode(digest)[..16]))
}

/// Fetches the repodata for one channel subdirectory, using and refreshing
/// the on-disk cache.
///
/// The compressed `repodata.json.bz2` variant is preferred; servers that do
/// not provide it fall back to the plain file. A cached copy with a matching
/// etag is reused without downloading the body again.
pub async fn fetch_repo_data(
    client: &reqwest::Client,
    subdir_url: &Url,
    cache_dir: &Path,
) -> Result<RepoData, FetchRepoDataError> {
    fs_err::create_dir_all(cache_dir)?;
    let cache_path = cache_path_for_url(cache_dir, subdir_url);
    let state_path = cache_path.with_extension("info.json");

    let cached_state: Option<CacheState> = fs_err::read_to_string(&state_path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .filter(|state: &CacheState| state.url == subdir_url.as_str() && cache_path.is_file());

    // Try the compressed variant first, then the plain file.
    let bz2_url = subdir_url
        .join("repodata.json.bz2")
        .expect("repodata.json.bz2 is a valid url fragment");
    let plain_url = subdir_url
        .join("repodata.json")
        .expect("repodata.json is a valid url fragment");

    let result = match fetch_one(client, &bz2_url, true, cached_state.as_ref()).await {
        Err(FetchRepoDataError::NotFound(_)) => {
            fetch_one(client, &plain_url, false, cached_state.as_ref()).await
        }
        result => result,
    }?;

    let bytes = match result {
        FetchResult::NotModified => {
            tracing::debug!("{subdir_url} not modified, using cached repodata");
            fs_err::read(&cache_path)?
        }
        FetchResult::Fetched { bytes, etag } => {
            fs_err::write(&cache_path, &bytes)?;
            let state = CacheState {
                url: subdir_url.as_str().to_owned(),
                etag,
            };
            let state_json = serde_json::to_string(&state).map_err(std::io::Error::from)?;
            fs_err::write(&state_path, state_json.as_bytes())?;
            bytes
        }
    };

    serde_json::from_slice(&bytes)
        .map_err(|e| FetchRepoDataError::InvalidRepoData(plain_url, e))
}

enum FetchResult {
    NotModified,
    Fetched {
        bytes: Vec<u8>,
        etag: Option<String>,
    },
}

async fn fetch_one(
    client: &reqwest::Client,
    url: &Url,
    compressed: bool,
    cached: Option<&CacheState>,
) -> Result<FetchResult, FetchRepoDataError> {
    let mut request = client.get(url.clone());
    if let Some(etag) = cached.and_then(|state| state.etag.as_deref()) {
        request = request.header(reqwest::header::IF_NONE_MATCH, etag);
    }

    let response = request
        .send()
        .await
        .map_err(|e| FetchRepoDataError::HttpError(url.clone(), e))?;

    match response.status() {
        StatusCode::NOT_MODIFIED => return Ok(FetchResult::NotModified),
        StatusCode::NOT_FOUND => return Err(FetchRepoDataError::NotFound(url.clone())),
        _ => {}
    }
    let response = response
        .error_for_status()
        .map_err(|e| FetchRepoDataError::HttpError(url.clone(), e))?;

    let etag = response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchRepoDataError::HttpError(url.clone(), e))?;

    let bytes = if compressed {
        let mut decoded = Vec::new();
        bzip2::read::BzDecoder::new(body.as_ref())
            .read_to_end(&mut decoded)
            .map_err(|e| FetchRepoDataError::InvalidCompression(url.clone(), e))?;
        decoded
    } else {
        body.to_vec()
    };

    Ok(FetchResult::Fetched { bytes, etag })
}

#[cfg(test)]
mod test {
    use super::cache_path_for_url;

    #[test]
    fn cache_path_is_stable_per_url() {
        let cache_dir = std::path::Path::new("/cache");
        let a = url::Url::parse("https://conda.anaconda.org/conda-forge/linux-64/").unwrap();
        let b = url::Url::parse("https://conda.anaconda.org/conda-forge/noarch/").unwrap();

        let path_a = cache_path_for_url(cache_dir, &a);
        assert_eq!(path_a, cache_path_for_url(cache_dir, &a));
        assert_ne!(path_a, cache_path_for_url(cache_dir, &b));
        assert!(path_a.to_string_lossy().ends_with(".json"));
    }
}
