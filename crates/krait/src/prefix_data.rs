//! The installed-record database of a prefix.
//!
//! Each installed package is one JSON file under `<prefix>/conda-meta/`. A
//! [`PrefixData`] handle owns the parsed set for one prefix; a process-wide
//! cache keyed by prefix path avoids rereading `conda-meta` for every query
//! and is invalidated by any mutating call, so a record removed on disk is
//! reflected on the next read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use krait_conda_types::{MatchSpec, Matches, PrefixRecord};
use parking_lot::Mutex;

/// An error from reading or writing prefix records.
#[derive(Debug, thiserror::Error)]
pub enum PrefixDataError {
    /// The prefix has no `conda-meta` directory.
    #[error("'{0}' is not a conda environment (no conda-meta directory)")]
    NotAnEnvironment(PathBuf),

    /// The prefix cannot be written.
    #[error("the environment '{0}' is not writable")]
    NotWritable(PathBuf),

    /// Reading or writing a record file failed.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// The process-wide record cache. The canonical set per prefix is stored so
/// that concurrent readers share one parse.
static RECORD_CACHE: Mutex<Option<HashMap<PathBuf, Arc<Vec<PrefixRecord>>>>> = Mutex::new(None);

fn cache_get(prefix: &Path) -> Option<Arc<Vec<PrefixRecord>>> {
    RECORD_CACHE
        .lock()
        .as_ref()
        .and_then(|cache| cache.get(prefix).cloned())
}

fn cache_put(prefix: &Path, records: Arc<Vec<PrefixRecord>>) {
    RECORD_CACHE
        .lock()
        .get_or_insert_with(HashMap::new)
        .insert(prefix.to_path_buf(), records);
}

fn cache_invalidate(prefix: &Path) {
    if let Some(cache) = RECORD_CACHE.lock().as_mut() {
        cache.remove(prefix);
    }
}

/// A handle on the installed records of one prefix.
#[derive(Debug, Clone)]
pub struct PrefixData {
    prefix: PathBuf,
    records: Arc<Vec<PrefixRecord>>,
}

impl PrefixData {
    /// Loads the records of a prefix, reusing the process-wide cache. A
    /// prefix without a `conda-meta` directory loads as empty.
    pub fn from_prefix(prefix: impl Into<PathBuf>) -> Result<Self, PrefixDataError> {
        let prefix = prefix.into();
        if let Some(records) = cache_get(&prefix) {
            return Ok(Self { prefix, records });
        }

        let records = Arc::new(PrefixRecord::collect_from_prefix(&prefix)?);
        cache_put(&prefix, records.clone());
        Ok(Self { prefix, records })
    }

    /// The prefix this handle refers to.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Returns true if the prefix has a `conda-meta` directory.
    pub fn is_environment(&self) -> bool {
        self.prefix.join("conda-meta").is_dir()
    }

    /// Creates the `conda-meta` directory, marking the prefix as an
    /// environment.
    pub fn init_environment(&self) -> Result<(), PrefixDataError> {
        fs_err::create_dir_all(self.prefix.join("conda-meta"))?;
        Ok(())
    }

    /// Iterates over all installed records.
    pub fn iter_records(&self) -> impl Iterator<Item = &PrefixRecord> {
        self.records.iter()
    }

    /// Returns the installed record of a package name, if any. A prefix
    /// holds at most one record per name.
    pub fn get(&self, name: &str) -> Option<&PrefixRecord> {
        self.records
            .iter()
            .find(|r| r.repodata_record.package_record.name.as_normalized() == name)
    }

    /// Returns the installed records matching a spec.
    pub fn query(&self, spec: &MatchSpec) -> Vec<&PrefixRecord> {
        self.records
            .iter()
            .filter(|r| spec.matches(&r.repodata_record))
            .collect()
    }

    /// Writes a record into `conda-meta` and invalidates the cache. The next
    /// read sees the new state.
    pub fn insert(&mut self, record: PrefixRecord) -> Result<(), PrefixDataError> {
        let conda_meta = self.prefix.join("conda-meta");
        if !conda_meta.is_dir() {
            return Err(PrefixDataError::NotAnEnvironment(self.prefix.clone()));
        }
        record.write_to_path(conda_meta.join(record.file_name()), true)?;
        self.reload()
    }

    /// Removes the record of a package name and invalidates the cache.
    pub fn remove(&mut self, name: &str) -> Result<(), PrefixDataError> {
        let Some(record) = self.get(name) else {
            return Ok(());
        };
        let path = self.prefix.join("conda-meta").join(record.file_name());
        fs_err::remove_file(path)?;
        self.reload()
    }

    /// Invalidates the process-wide cache for this prefix and rereads the
    /// records from disk.
    pub fn reload(&mut self) -> Result<(), PrefixDataError> {
        cache_invalidate(&self.prefix);
        self.records = Arc::new(PrefixRecord::collect_from_prefix(&self.prefix)?);
        cache_put(&self.prefix, self.records.clone());
        Ok(())
    }

    /// Invalidates the cache for a prefix without holding a handle; used by
    /// the transaction after it rewrote `conda-meta` itself.
    pub fn invalidate(prefix: &Path) {
        cache_invalidate(prefix);
    }
}

#[cfg(test)]
mod test {
    use super::PrefixData;
    use krait_conda_types::{
        MatchSpec, PackageName, PackageRecord, ParseStrictness, PrefixRecord, RepoDataRecord,
        Version,
    };
    use std::str::FromStr;

    fn record(name: &str, version: &str) -> PrefixRecord {
        let package_record = PackageRecord::new(
            PackageName::new_unchecked(name),
            Version::from_str(version).unwrap(),
            "0".to_owned(),
        );
        PrefixRecord::from_repodata_record(
            RepoDataRecord {
                file_name: format!("{name}-{version}-0.tar.bz2"),
                url: url::Url::parse(&format!("https://example.com/{name}-{version}-0.tar.bz2"))
                    .unwrap(),
                channel: "defaults".to_owned(),
                package_record,
            },
            None,
            None,
            Vec::new(),
            None,
            None,
        )
    }

    #[test]
    fn insert_query_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = PrefixData::from_prefix(dir.path()).unwrap();
        assert!(!data.is_environment());
        data.init_environment().unwrap();
        assert!(data.is_environment());

        data.insert(record("numpy", "1.21.0")).unwrap();
        data.insert(record("python", "3.9.0")).unwrap();
        assert_eq!(data.iter_records().count(), 2);
        assert!(data.get("numpy").is_some());
        assert!(data.get("scipy").is_none());

        let matches = data.query(
            &MatchSpec::from_str("numpy >=1.20", ParseStrictness::Lenient).unwrap(),
        );
        assert_eq!(matches.len(), 1);

        data.remove("numpy").unwrap();
        assert!(data.get("numpy").is_none());
        assert_eq!(data.iter_records().count(), 1);
    }

    #[test]
    fn cache_reflects_disk_changes_after_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = PrefixData::from_prefix(dir.path()).unwrap();
        data.init_environment().unwrap();
        data.insert(record("numpy", "1.21.0")).unwrap();

        // A second handle sees the cached state.
        let other = PrefixData::from_prefix(dir.path()).unwrap();
        assert_eq!(other.iter_records().count(), 1);

        // Remove the file behind the cache's back, then invalidate.
        let file = dir
            .path()
            .join("conda-meta")
            .join("numpy-1.21.0-0.json");
        std::fs::remove_file(file).unwrap();
        PrefixData::invalidate(dir.path());

        let fresh = PrefixData::from_prefix(dir.path()).unwrap();
        assert_eq!(fresh.iter_records().count(), 0);
    }
}
