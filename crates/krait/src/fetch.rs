//! The progressive fetch/extract pipeline.
//!
//! Given the records a transaction wants to link, every record is driven
//! through the package cache independently: already-extracted entries return
//! immediately, cached tarballs extract, everything else downloads first.
//! Records proceed in parallel under a bounded semaphore; the failure of one
//! record never aborts the others, and all failures are reported together.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use krait_cache::{PackageCache, PackageCacheError};
use krait_conda_types::RepoDataRecord;
use tokio::sync::Semaphore;

/// The default number of concurrent downloads. Extraction happens on the
/// blocking pool and is effectively bounded by the CPU count.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 5;

/// All per-record failures of one pipeline run.
#[derive(Debug)]
pub struct FetchErrors {
    /// The failures, as (dist string, error) pairs.
    pub failures: Vec<(String, PackageCacheError)>,
}

impl std::error::Error for FetchErrors {}

impl Display for FetchErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "failed to fetch {} package(s):", self.failures.len())?;
        for (dist, error) in &self.failures {
            writeln!(f, "  - {dist}: {error}")?;
        }
        Ok(())
    }
}

/// Ensures every record has an extracted cache entry, downloading and
/// extracting with bounded parallelism.
///
/// Returns the extracted directory per dist string. When any record fails,
/// the collected failures are returned instead; successfully fetched records
/// stay in the cache.
pub async fn populate_cache(
    records: &[RepoDataRecord],
    cache: &PackageCache,
    client: &reqwest::Client,
    max_concurrent_fetches: usize,
) -> Result<HashMap<String, PathBuf>, FetchErrors> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent_fetches.max(1)));

    let mut tasks = FuturesUnordered::new();
    for record in records {
        let semaphore = semaphore.clone();
        tasks.push(async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("the semaphore is never closed");
            let dist = record.package_record.dist_str();
            let result = cache.ensure_extracted(record, client).await;
            (dist, result)
        });
    }

    let mut extracted = HashMap::new();
    let mut failures = Vec::new();
    while let Some((dist, result)) = tasks.next().await {
        match result {
            Ok(path) => {
                extracted.insert(dist, path);
            }
            Err(error) => {
                tracing::warn!("failed to fetch {dist}: {error}");
                failures.push((dist, error));
            }
        }
    }

    if failures.is_empty() {
        Ok(extracted)
    } else {
        // Deterministic order for error output.
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        Err(FetchErrors { failures })
    }
}

#[cfg(test)]
mod test {
    use super::populate_cache;
    use krait_cache::PackageCache;
    use krait_conda_types::{PackageName, PackageRecord, RepoDataRecord, Version};
    use std::io::Write;
    use std::str::FromStr;

    fn archive() -> Vec<u8> {
        let mut tarball = tar::Builder::new(Vec::new());
        let contents: &[u8] =
            br#"{"build": "0", "build_number": 0, "name": "dummy", "subdir": "linux-64", "version": "1.0"}"#;
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tarball
            .append_data(&mut header, "info/index.json", contents)
            .unwrap();
        let data = tarball.into_inner().unwrap();
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(&data).unwrap();
        encoder.finish().unwrap()
    }

    fn record(name: &str) -> RepoDataRecord {
        let package_record = PackageRecord::new(
            PackageName::new_unchecked(name),
            Version::from_str("1.0").unwrap(),
            "0".to_owned(),
        );
        RepoDataRecord {
            file_name: format!("{name}-1.0-0.tar.bz2"),
            url: url::Url::parse(&format!("https://example.invalid/{name}-1.0-0.tar.bz2"))
                .unwrap(),
            channel: "defaults".to_owned(),
            package_record,
        }
    }

    #[tokio::test]
    async fn uses_cached_tarballs_without_network() {
        let cache_dir = tempfile::tempdir().unwrap();
        std::fs::write(cache_dir.path().join("dummy-1.0-0.tar.bz2"), archive()).unwrap();

        let cache = PackageCache::new(cache_dir.path());
        let client = reqwest::Client::new();
        let extracted = populate_cache(&[record("dummy")], &cache, &client, 2)
            .await
            .unwrap();
        assert!(extracted["dummy-1.0-0"].join("info/index.json").is_file());
    }

    #[tokio::test]
    async fn failures_are_isolated_and_aggregated() {
        let cache_dir = tempfile::tempdir().unwrap();
        // Only one of the two records has a cached archive; the other needs
        // the network, which the .invalid domain denies.
        std::fs::write(cache_dir.path().join("dummy-1.0-0.tar.bz2"), archive()).unwrap();

        let cache = PackageCache::new(cache_dir.path());
        let client = reqwest::Client::new();
        let err = populate_cache(
            &[record("dummy"), record("missing")],
            &cache,
            &client,
            2,
        )
        .await
        .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, "missing-1.0-0");
        // The good record is still extracted in the cache.
        assert!(cache_dir
            .path()
            .join("dummy-1.0-0")
            .join("info/index.json")
            .is_file());
    }
}
