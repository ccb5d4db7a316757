//! The query language for conda packages: [`MatchSpec`].

pub mod parse;

use std::fmt::{Display, Formatter};

use krait_digest::serde::HexDigest;
use krait_digest::{Md5Hash, Sha256Hash};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none};

use crate::{
    BuildNumberSpec, PackageName, PackageRecord, RepoDataRecord, StringMatcher, VersionSpec,
};

pub use parse::ParseMatchSpecError;

/// A constraint over [`PackageRecord`]s.
///
/// The canonical written form is
/// `(channel(/subdir)::)name (version (build))[key1=value1,key2=value2]`
/// where every part except the name is optional. A spec with an exact
/// channel, subdir, name, version and build matches at most one record.
///
/// Matching is deterministic and total: it only looks at the fields of the
/// spec and the record, and it never fails.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct MatchSpec {
    /// The name of the package.
    pub name: Option<PackageName>,
    /// The version constraint (e.g. `1.2.3`, `>=1.2.3`, `1.2.*`).
    pub version: Option<VersionSpec>,
    /// The build string constraint (e.g. `py37_0`, `py37*`).
    pub build: Option<StringMatcher>,
    /// The build number constraint.
    pub build_number: Option<BuildNumberSpec>,
    /// Match a specific archive filename.
    pub file_name: Option<String>,
    /// The channel the package must come from.
    pub channel: Option<String>,
    /// The subdir (platform) of the channel.
    pub subdir: Option<String>,
    /// The MD5 hash of the package archive.
    #[serde_as(as = "Option<HexDigest<krait_digest::Md5>>")]
    pub md5: Option<Md5Hash>,
    /// The SHA256 hash of the package archive.
    #[serde_as(as = "Option<HexDigest<krait_digest::Sha256>>")]
    pub sha256: Option<Sha256Hash>,
    /// Features the matched record must provide.
    pub features: Option<Vec<String>>,
    /// Track-features the matched record must activate.
    pub track_features: Option<Vec<String>>,
    /// Whether this spec is optional: the solver only enforces it when the
    /// package ends up installed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    /// A hint naming the record this spec is intended to replace.
    pub target: Option<String>,
}

/// Like [`MatchSpec`] but without the package name; useful where the name is
/// already known from context, e.g. `foo = "3.4.1 *cuda"` style mappings.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct NamelessMatchSpec {
    /// The version constraint.
    pub version: Option<VersionSpec>,
    /// The build string constraint.
    pub build: Option<StringMatcher>,
    /// The build number constraint.
    pub build_number: Option<BuildNumberSpec>,
    /// Match a specific archive filename.
    pub file_name: Option<String>,
    /// The channel the package must come from.
    pub channel: Option<String>,
    /// The subdir (platform) of the channel.
    pub subdir: Option<String>,
    /// The MD5 hash of the package archive.
    #[serde_as(as = "Option<HexDigest<krait_digest::Md5>>")]
    pub md5: Option<Md5Hash>,
    /// The SHA256 hash of the package archive.
    #[serde_as(as = "Option<HexDigest<krait_digest::Sha256>>")]
    pub sha256: Option<Sha256Hash>,
}

impl MatchSpec {
    /// Decomposes this spec into the name and the rest.
    pub fn into_nameless(self) -> (Option<PackageName>, NamelessMatchSpec) {
        (
            self.name,
            NamelessMatchSpec {
                version: self.version,
                build: self.build,
                build_number: self.build_number,
                file_name: self.file_name,
                channel: self.channel,
                subdir: self.subdir,
                md5: self.md5,
                sha256: self.sha256,
            },
        )
    }

    /// Constructs a [`MatchSpec`] from a [`NamelessMatchSpec`] and a name.
    pub fn from_nameless(spec: NamelessMatchSpec, name: Option<PackageName>) -> Self {
        Self {
            name,
            version: spec.version,
            build: spec.build,
            build_number: spec.build_number,
            file_name: spec.file_name,
            channel: spec.channel,
            subdir: spec.subdir,
            md5: spec.md5,
            sha256: spec.sha256,
            features: None,
            track_features: None,
            optional: false,
            target: None,
        }
    }

    /// Returns all records matching this spec, in the deterministic
    /// preference order: newest version first, then highest build number,
    /// build string, newest timestamp, filename.
    pub fn find_matches<'a>(&self, records: &'a [RepoDataRecord]) -> Vec<&'a RepoDataRecord> {
        let mut matches: Vec<&RepoDataRecord> =
            records.iter().filter(|r| self.matches(*r)).collect();
        matches.sort_by(|a, b| {
            let pa = &a.package_record;
            let pb = &b.package_record;
            pb.version
                .cmp(&pa.version)
                .then_with(|| pb.build_number.cmp(&pa.build_number))
                .then_with(|| pa.build.cmp(&pb.build))
                .then_with(|| pb.timestamp.cmp(&pa.timestamp))
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        matches
    }
}

/// The behavior of matching a spec against a record.
pub trait Matches<T> {
    /// Returns true when `record` satisfies this spec.
    fn matches(&self, record: &T) -> bool;
}

impl Matches<PackageRecord> for MatchSpec {
    fn matches(&self, record: &PackageRecord) -> bool {
        if let Some(name) = &self.name {
            if name != &record.name {
                return false;
            }
        }

        if let Some(spec) = &self.version {
            if !spec.matches(&record.version) {
                return false;
            }
        }

        if let Some(build) = &self.build {
            if !build.matches(&record.build) {
                return false;
            }
        }

        if let Some(build_number) = &self.build_number {
            if !build_number.matches(&record.build_number) {
                return false;
            }
        }

        if let Some(md5) = &self.md5 {
            if Some(md5) != record.md5.as_ref() {
                return false;
            }
        }

        if let Some(sha256) = &self.sha256 {
            if Some(sha256) != record.sha256.as_ref() {
                return false;
            }
        }

        if let Some(subdir) = &self.subdir {
            if subdir != &record.subdir {
                return false;
            }
        }

        // A features predicate requires the record to offer every feature.
        if let Some(features) = &self.features {
            let offered = record.features.as_deref().unwrap_or(&[]);
            if !features.iter().all(|f| offered.contains(f)) {
                return false;
            }
        }

        if let Some(track_features) = &self.track_features {
            if !track_features
                .iter()
                .all(|f| record.track_features.contains(f))
            {
                return false;
            }
        }

        true
    }
}

impl Matches<RepoDataRecord> for MatchSpec {
    fn matches(&self, record: &RepoDataRecord) -> bool {
        if let Some(file_name) = &self.file_name {
            if file_name != &record.file_name {
                return false;
            }
        }

        if let Some(channel) = &self.channel {
            if !channel_matches(channel, &record.channel) {
                return false;
            }
        }

        self.matches(&record.package_record)
    }
}

impl Matches<PackageRecord> for NamelessMatchSpec {
    fn matches(&self, record: &PackageRecord) -> bool {
        MatchSpec::from_nameless(self.clone(), None).matches(record)
    }
}

/// Returns true when the channel constraint of a spec matches the canonical
/// channel of a record. The record channel is a base url; the constraint may
/// be a bare name or a url.
fn channel_matches(spec_channel: &str, record_channel: &str) -> bool {
    let spec = spec_channel.trim_end_matches('/');
    let record = record_channel.trim_end_matches('/');
    record == spec || record.ends_with(&format!("/{spec}"))
}

impl Display for MatchSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(channel) = &self.channel {
            write!(f, "{channel}")?;
            if let Some(subdir) = &self.subdir {
                write!(f, "/{subdir}")?;
            }
            write!(f, "::")?;
        }

        match &self.name {
            Some(name) => write!(f, "{}", name.as_normalized())?,
            None => write!(f, "*")?,
        }

        if let Some(version) = &self.version {
            write!(f, " {version}")?;
        }

        if let Some(build) = &self.build {
            write!(f, " {build}")?;
        }

        let mut keys = Vec::new();
        if self.channel.is_none() {
            if let Some(subdir) = &self.subdir {
                keys.push(format!("subdir={subdir}"));
            }
        }
        if let Some(file_name) = &self.file_name {
            keys.push(format!("fn=\"{file_name}\""));
        }
        if let Some(md5) = &self.md5 {
            keys.push(format!("md5={md5:x}"));
        }
        if let Some(sha256) = &self.sha256 {
            keys.push(format!("sha256={sha256:x}"));
        }
        if let Some(build_number) = &self.build_number {
            keys.push(format!("build_number={build_number}"));
        }
        if let Some(features) = &self.features {
            keys.push(format!("features=\"{}\"", features.join(" ")));
        }
        if let Some(track_features) = &self.track_features {
            keys.push(format!("track_features=\"{}\"", track_features.join(" ")));
        }
        if let Some(target) = &self.target {
            keys.push(format!("target={target}"));
        }
        if self.optional {
            keys.push("optional".to_owned());
        }
        if !keys.is_empty() {
            write!(f, "[{}]", keys.join(", "))?;
        }

        Ok(())
    }
}

impl From<PackageName> for MatchSpec {
    fn from(value: PackageName) -> Self {
        Self {
            name: Some(value),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::{
        MatchSpec, Matches, PackageName, PackageRecord, ParseStrictness, RepoDataRecord, Version,
    };

    fn record(name: &str, version: &str, build: &str, build_number: u64) -> PackageRecord {
        let mut record = PackageRecord::new(
            PackageName::new_unchecked(name),
            Version::from_str(version).unwrap(),
            build.to_owned(),
        );
        record.build_number = build_number;
        record.subdir = "linux-64".to_owned();
        record
    }

    fn repo_record(name: &str, version: &str, build: &str, build_number: u64) -> RepoDataRecord {
        let package_record = record(name, version, build, build_number);
        RepoDataRecord {
            file_name: format!("{}.tar.bz2", package_record.dist_str()),
            url: url::Url::parse(&format!(
                "https://conda.anaconda.org/conda-forge/linux-64/{}.tar.bz2",
                package_record.dist_str()
            ))
            .unwrap(),
            channel: "https://conda.anaconda.org/conda-forge/".to_owned(),
            package_record,
        }
    }

    #[test]
    fn match_on_version_and_build() {
        let spec = MatchSpec::from_str("foo >=1.0 py27*", ParseStrictness::Lenient).unwrap();
        assert!(spec.matches(&record("foo", "1.0", "py27_0", 0)));
        assert!(!spec.matches(&record("foo", "0.9", "py27_0", 0)));
        assert!(!spec.matches(&record("foo", "1.0", "py36_0", 0)));
        assert!(!spec.matches(&record("bar", "1.0", "py27_0", 0)));
    }

    #[test]
    fn match_on_channel() {
        let spec =
            MatchSpec::from_str("conda-forge::foo", ParseStrictness::Lenient).unwrap();
        assert!(spec.matches(&repo_record("foo", "1.0", "0", 0)));

        let spec = MatchSpec::from_str("bioconda::foo", ParseStrictness::Lenient).unwrap();
        assert!(!spec.matches(&repo_record("foo", "1.0", "0", 0)));
    }

    #[test]
    fn match_on_features() {
        let mut with_feature = record("foo", "1.0", "0", 0);
        with_feature.features = Some(vec!["mkl".to_owned()]);

        let spec = MatchSpec::from_str("foo[features=\"mkl\"]", ParseStrictness::Lenient).unwrap();
        assert!(spec.matches(&with_feature));
        assert!(!spec.matches(&record("foo", "1.0", "0", 0)));
    }

    #[test]
    fn find_matches_order() {
        let records = vec![
            repo_record("foo", "1.0", "0", 0),
            repo_record("foo", "2.0", "0", 0),
            repo_record("foo", "2.0", "1", 1),
            repo_record("bar", "9.0", "0", 0),
        ];
        let spec = MatchSpec::from_str("foo", ParseStrictness::Lenient).unwrap();
        let matches = spec.find_matches(&records);
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].package_record.version.to_string(), "2.0");
        assert_eq!(matches[0].package_record.build_number, 1);
        assert_eq!(matches[1].package_record.build_number, 0);
        assert_eq!(matches[2].package_record.version.to_string(), "1.0");
    }

    #[test]
    fn display_roundtrip() {
        for spec in [
            "foo >=1.0 py27*",
            "conda-forge::foo ==1.0",
            "foo",
            "foo 1.0.*",
        ] {
            let parsed = MatchSpec::from_str(spec, ParseStrictness::Lenient).unwrap();
            let redisplayed = parsed.to_string();
            let reparsed = MatchSpec::from_str(&redisplayed, ParseStrictness::Lenient).unwrap();
            assert_eq!(parsed, reparsed, "{spec} -> {redisplayed}");
        }
    }
}
