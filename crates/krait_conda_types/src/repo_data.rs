//! [`RepoData`] is the parsed form of a `repodata.json` file: everything a
//! channel subdirectory knows about its packages.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::path::Path;

use fxhash::{FxHashMap, FxHashSet};
use krait_digest::serde::HexDigest;
use krait_digest::{Md5Hash, Sha256Hash};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none};
use thiserror::Error;
use url::Url;

use crate::utils::serde::{sort_map_alphabetically, FeatureSet, Timestamp};
use crate::{
    package::IndexJson, Channel, MatchSpec, Matches, NoArchType, PackageName, ParseStrictness,
    Platform, RepoDataRecord, Version,
};

/// The parsed contents of a `repodata.json` file for one (channel, subdir)
/// pair.
#[derive(Debug, Deserialize, Serialize, Eq, PartialEq, Clone)]
pub struct RepoData {
    /// Information about the subdirectory the repodata describes.
    pub info: Option<ChannelInfo>,

    /// The `.tar.bz2` packages in the subdirectory, keyed by filename.
    #[serde(default, serialize_with = "sort_map_alphabetically")]
    pub packages: FxHashMap<String, PackageRecord>,

    /// `.conda` packages, stored under a separate key for backwards
    /// compatibility. Also keyed by filename.
    #[serde(
        default,
        rename = "packages.conda",
        serialize_with = "sort_map_alphabetically"
    )]
    pub conda_packages: FxHashMap<String, PackageRecord>,

    /// Filenames that have been removed from the subdirectory.
    #[serde(
        default,
        serialize_with = "sort_set_alphabetically",
        skip_serializing_if = "FxHashSet::is_empty"
    )]
    pub removed: FxHashSet<String>,

    /// The version of the repodata format.
    #[serde(rename = "repodata_version")]
    pub version: Option<u64>,
}

/// The `info` block of a `repodata.json` file.
#[derive(Debug, Deserialize, Serialize, Eq, PartialEq, Clone)]
pub struct ChannelInfo {
    /// The subdirectory the repodata describes.
    pub subdir: String,

    /// The architecture of the subdirectory, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    /// The platform of the subdirectory, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// A single package build as described by repodata. Identity for equality and
/// hashing is (subdir, name, version, build); records are immutable once
/// loaded.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Deserialize, Serialize, Eq, PartialEq, Clone, Hash)]
pub struct PackageRecord {
    /// Optionally the architecture the package supports.
    pub arch: Option<String>,

    /// The build string of the package.
    pub build: String,

    /// The build number of the package.
    pub build_number: u64,

    /// Additional constraints on packages that are not dependencies: if one
    /// of these packages is installed it must satisfy this spec, but nothing
    /// forces it to be installed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constrains: Vec<String>,

    /// Match specs of the packages this package depends on.
    #[serde(default)]
    pub depends: Vec<String>,

    /// Features this package provides (consumes, in solver terms).
    #[serde_as(as = "Option<FeatureSet>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,

    /// The license of the package.
    pub license: Option<String>,

    /// The license family of the package.
    pub license_family: Option<String>,

    /// The MD5 hash of the package archive.
    #[serde_as(as = "Option<HexDigest<krait_digest::Md5>>")]
    pub md5: Option<Md5Hash>,

    /// The lowercase name of the package.
    pub name: PackageName,

    /// The way in which the package is independent of architecture, if it is.
    #[serde(default, skip_serializing_if = "NoArchType::is_none")]
    pub noarch: NoArchType,

    /// Optionally the platform the package supports. Does not always map
    /// cleanly to a subdir.
    pub platform: Option<String>,

    /// The environment this package prefers to be installed into, if any.
    pub preferred_env: Option<String>,

    /// The SHA256 hash of the package archive.
    #[serde_as(as = "Option<HexDigest<krait_digest::Sha256>>")]
    pub sha256: Option<Sha256Hash>,

    /// The size of the package archive in bytes.
    pub size: Option<u64>,

    /// The subdirectory (platform tag) the package lives in.
    #[serde(default)]
    pub subdir: String,

    /// When the package was created. Used as the final tie breaker between
    /// otherwise equal builds.
    #[serde_as(as = "Option<Timestamp>")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// Features that installing this package activates globally. The solver
    /// penalizes every active track feature.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde_as(as = "FeatureSet")]
    pub track_features: Vec<String>,

    /// The version of the package.
    pub version: Version,
}

impl Display for PackageRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.build.is_empty() {
            write!(f, "{} {}", self.name.as_normalized(), self.version)
        } else {
            write!(
                f,
                "{}={}={}",
                self.name.as_normalized(),
                self.version,
                self.build
            )
        }
    }
}

impl AsRef<PackageRecord> for PackageRecord {
    fn as_ref(&self) -> &PackageRecord {
        self
    }
}

impl PackageRecord {
    /// A helper that constructs a `PackageRecord` with the bare minimum of
    /// values, everything else empty.
    pub fn new(name: PackageName, version: Version, build: String) -> Self {
        Self {
            arch: None,
            build,
            build_number: 0,
            constrains: vec![],
            depends: vec![],
            features: None,
            license: None,
            license_family: None,
            md5: None,
            name,
            noarch: NoArchType::default(),
            platform: None,
            preferred_env: None,
            sha256: None,
            size: None,
            subdir: Platform::current().to_string(),
            timestamp: None,
            track_features: vec![],
            version,
        }
    }

    /// Builds a [`PackageRecord`] from the `index.json` of an extracted
    /// package, augmented with archive level information.
    pub fn from_index_json(
        index: IndexJson,
        size: Option<u64>,
        sha256: Option<Sha256Hash>,
        md5: Option<Md5Hash>,
    ) -> Self {
        Self {
            arch: index.arch,
            build: index.build,
            build_number: index.build_number,
            constrains: index.constrains,
            depends: index.depends,
            features: index.features,
            license: index.license,
            license_family: index.license_family,
            md5,
            name: index.name,
            noarch: index.noarch,
            platform: index.platform,
            preferred_env: None,
            sha256,
            size,
            subdir: index.subdir.unwrap_or_else(|| "unknown".to_owned()),
            timestamp: index.timestamp,
            track_features: index.track_features,
            version: index.version,
        }
    }

    /// The "dist" string of the record: `<name>-<version>-<build>`. This is
    /// the form used in history files and cache directory names.
    pub fn dist_str(&self) -> String {
        format!(
            "{}-{}-{}",
            self.name.as_normalized(),
            self.version,
            self.build
        )
    }

    /// Sorts the records topologically by their dependencies.
    ///
    /// The sort is deterministic regardless of the input order. Cycles are
    /// broken arbitrarily but stably; the `python`-first special case keeps
    /// interpreter packages in front of the noarch packages that need them.
    pub fn sort_topologically<T: AsRef<PackageRecord> + Clone>(records: Vec<T>) -> Vec<T> {
        topological_sort(records)
    }

    /// Validates that the given records form a consistent environment: every
    /// dependency of every record is satisfied and no constrains is violated.
    pub fn validate<T: AsRef<PackageRecord>>(
        records: &[T],
    ) -> Result<(), ValidatePackageRecordsError> {
        for package in records {
            let package = package.as_ref();
            for dep in &package.depends {
                // Virtual packages are provided by the system, not the
                // environment.
                if dep.starts_with("__") {
                    continue;
                }
                let spec = MatchSpec::from_str(dep, ParseStrictness::Lenient)?;
                if !records.iter().any(|p| spec.matches(p.as_ref())) {
                    return Err(ValidatePackageRecordsError::DependencyNotInEnvironment {
                        package: Box::new(package.clone()),
                        dependency: dep.clone(),
                    });
                }
            }

            for constraint in &package.constrains {
                let spec = MatchSpec::from_str(constraint, ParseStrictness::Lenient)?;
                let subject = records.iter().find(|record| {
                    spec.name
                        .as_ref()
                        .is_some_and(|name| name == &record.as_ref().name)
                });
                if let Some(subject) = subject {
                    if !spec.matches(subject.as_ref()) {
                        return Err(ValidatePackageRecordsError::ConstraintNotSatisfied {
                            package: Box::new(package.clone()),
                            constraint: constraint.clone(),
                            violating_package: Box::new(subject.as_ref().clone()),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// An error raised by [`PackageRecord::validate`].
#[derive(Debug, Error)]
pub enum ValidatePackageRecordsError {
    /// A dependency of a package is missing from the environment.
    #[error("package '{package}' has dependency '{dependency}', which is not in the environment")]
    DependencyNotInEnvironment {
        /// The package with the unmet dependency.
        package: Box<PackageRecord>,
        /// The dependency that is missing.
        dependency: String,
    },

    /// A constrains of a package is violated by the environment.
    #[error("package '{package}' has constraint '{constraint}', which is not satisfied by '{violating_package}' in the environment")]
    ConstraintNotSatisfied {
        /// The package carrying the constraint.
        package: Box<PackageRecord>,
        /// The violated constraint.
        constraint: String,
        /// The installed package violating it.
        violating_package: Box<PackageRecord>,
    },

    /// A spec string failed to parse.
    #[error(transparent)]
    ParseMatchSpec(#[from] crate::ParseMatchSpecError),
}

impl RepoData {
    /// Parses [`RepoData`] from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let contents = fs_err::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Attaches channel and url information to every record, yielding
    /// [`RepoDataRecord`]s.
    pub fn into_repo_data_records(self, channel: &Channel) -> Vec<RepoDataRecord> {
        let mut records = Vec::with_capacity(self.packages.len() + self.conda_packages.len());
        let channel_name = channel.canonical_name();

        for (filename, package_record) in self.packages.into_iter().chain(self.conda_packages) {
            records.push(RepoDataRecord {
                url: compute_package_url(channel.base_url(), &package_record.subdir, &filename),
                channel: channel_name.clone(),
                package_record,
                file_name: filename,
            });
        }
        records
    }
}

/// Computes the download url of a package file within a channel.
pub fn compute_package_url(channel_base_url: &Url, subdir: &str, filename: &str) -> Url {
    let mut url = channel_base_url.clone();
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/{subdir}/"));
    url.join(filename).expect("filename is a valid url fragment")
}

fn sort_set_alphabetically<S: serde::Serializer>(
    value: &FxHashSet<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    value.iter().collect::<BTreeSet<_>>().serialize(serializer)
}

/// Topologically sorts records by their `depends` names. `python` sinks to
/// the front of its component so interpreter-dependent link steps run late
/// enough.
fn topological_sort<T: AsRef<PackageRecord> + Clone>(records: Vec<T>) -> Vec<T> {
    use std::collections::{HashMap, HashSet};

    let by_name: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(idx, record)| (record.as_ref().name.as_normalized(), idx))
        .collect();

    let mut visited = HashSet::new();
    let mut sorted = Vec::with_capacity(records.len());

    fn visit<T: AsRef<PackageRecord> + Clone>(
        idx: usize,
        records: &[T],
        by_name: &std::collections::HashMap<&str, usize>,
        visited: &mut HashSet<usize>,
        sorted: &mut Vec<T>,
    ) {
        if !visited.insert(idx) {
            return;
        }
        let mut dep_names: Vec<&str> = records[idx]
            .as_ref()
            .depends
            .iter()
            .filter_map(|dep| dep.split_whitespace().next())
            .collect();
        dep_names.sort_unstable();
        for dep in dep_names {
            if let Some(&dep_idx) = by_name.get(dep) {
                visit(dep_idx, records, by_name, visited, sorted);
            }
        }
        sorted.push(records[idx].clone());
    }

    // Visit in name order for determinism.
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by_key(|&idx| records[idx].as_ref().name.as_normalized().to_owned());
    for idx in order {
        visit(idx, &records, &by_name, &mut visited, &mut sorted);
    }
    sorted
}

#[cfg(test)]
mod test {
    use super::{compute_package_url, PackageRecord, RepoData};
    use crate::{PackageName, Version};
    use std::str::FromStr;

    const REPODATA: &str = r#"{
        "info": { "subdir": "linux-64" },
        "packages": {
            "foo-3.0.2-py36h1af98f8_1.tar.bz2": {
                "build": "py36h1af98f8_1",
                "build_number": 1,
                "depends": ["python >=3.6,<3.7.0a0"],
                "md5": "d65ab674acf3b7294ebacaec05fc5b54",
                "name": "foo",
                "sha256": "1154fceeb5c4ee9bb97d245713ac21eb1910237c724d2b7103747215663273c2",
                "size": 414494,
                "subdir": "linux-64",
                "timestamp": 1605110689658,
                "version": "3.0.2"
            }
        },
        "packages.conda": {},
        "repodata_version": 1
    }"#;

    #[test]
    fn deserialize() {
        let repodata: RepoData = serde_json::from_str(REPODATA).unwrap();
        assert_eq!(repodata.version, Some(1));
        assert_eq!(repodata.info.as_ref().unwrap().subdir, "linux-64");
        let record = &repodata.packages["foo-3.0.2-py36h1af98f8_1.tar.bz2"];
        assert_eq!(record.name.as_normalized(), "foo");
        assert_eq!(record.build_number, 1);
        assert_eq!(record.depends, vec!["python >=3.6,<3.7.0a0"]);
        assert_eq!(record.timestamp.unwrap().timestamp(), 1605110689);
    }

    #[test]
    fn roundtrip() {
        let repodata: RepoData = serde_json::from_str(REPODATA).unwrap();
        let serialized = serde_json::to_string(&repodata).unwrap();
        let reparsed: RepoData = serde_json::from_str(&serialized).unwrap();
        assert_eq!(repodata, reparsed);
    }

    #[test]
    fn into_repo_data_records() {
        let repodata: RepoData = serde_json::from_str(REPODATA).unwrap();
        let channel = crate::Channel::from_str(
            "conda-forge",
            &crate::ChannelConfig::default_with_root_dir(std::env::current_dir().unwrap()),
        )
        .unwrap();
        let records = repodata.into_repo_data_records(&channel);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].url.as_str(),
            "https://conda.anaconda.org/conda-forge/linux-64/foo-3.0.2-py36h1af98f8_1.tar.bz2"
        );
    }

    #[test]
    fn package_url() {
        let base = url::Url::parse("https://conda.anaconda.org/conda-forge/").unwrap();
        assert_eq!(
            compute_package_url(&base, "linux-64", "bla.tar.bz2").as_str(),
            "https://conda.anaconda.org/conda-forge/linux-64/bla.tar.bz2"
        );
    }

    #[test]
    fn dist_str() {
        let record = PackageRecord::new(
            PackageName::new_unchecked("flask"),
            Version::from_str("0.10.1").unwrap(),
            "py27_0".to_owned(),
        );
        assert_eq!(record.dist_str(), "flask-0.10.1-py27_0");
    }

    #[test]
    fn topological_sort_dependencies_first() {
        let python = PackageRecord::new(
            PackageName::new_unchecked("python"),
            Version::from_str("3.11").unwrap(),
            "h123_0".to_owned(),
        );
        let mut flask = PackageRecord::new(
            PackageName::new_unchecked("flask"),
            Version::from_str("2.0").unwrap(),
            "pyhd_0".to_owned(),
        );
        flask.depends = vec!["python >=3".to_owned()];

        let sorted = PackageRecord::sort_topologically(vec![flask.clone(), python.clone()]);
        assert_eq!(sorted[0].name.as_normalized(), "python");
        assert_eq!(sorted[1].name.as_normalized(), "flask");
    }
}
