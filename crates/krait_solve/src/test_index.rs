//! Helpers for building in-memory indexes in tests.

use std::str::FromStr;

use krait_conda_types::{PackageName, PackageRecord, RepoDataRecord, Version};

/// Builds a linux-64 record with the given dependencies.
pub(crate) fn record(
    name: &str,
    version: &str,
    build: &str,
    build_number: u64,
    depends: &[&str],
) -> RepoDataRecord {
    record_in_channel(name, version, build, build_number, depends, "defaults")
}

/// Builds a record that lives in a specific channel.
pub(crate) fn record_in_channel(
    name: &str,
    version: &str,
    build: &str,
    build_number: u64,
    depends: &[&str],
    channel: &str,
) -> RepoDataRecord {
    let mut package_record = PackageRecord::new(
        PackageName::new_unchecked(name),
        Version::from_str(version).unwrap(),
        build.to_owned(),
    );
    package_record.build_number = build_number;
    package_record.subdir = "linux-64".to_owned();
    package_record.depends = depends.iter().map(|s| (*s).to_string()).collect();

    let file_name = format!("{name}-{version}-{build}.tar.bz2");
    RepoDataRecord {
        url: url::Url::parse(&format!("https://example.com/{channel}/linux-64/{file_name}"))
            .unwrap(),
        channel: channel.to_owned(),
        file_name,
        package_record,
    }
}

/// Builds a record that activates the given track features.
pub(crate) fn record_with_features(
    name: &str,
    version: &str,
    build: &str,
    build_number: u64,
    track_features: &[&str],
) -> RepoDataRecord {
    let mut record = record(name, version, build, build_number, &[]);
    record.package_record.track_features =
        track_features.iter().map(|s| (*s).to_string()).collect();
    record
}

/// Builds the synthetic record for a feature, the way the index loader does.
pub(crate) fn feature_record(feature: &str) -> RepoDataRecord {
    let name = format!("@{feature}");
    let mut package_record = PackageRecord::new(
        PackageName::new_unchecked(name.clone()),
        Version::from_str("0").unwrap(),
        "0".to_owned(),
    );
    package_record.subdir = "noarch".to_owned();
    package_record.track_features = vec![feature.to_owned()];

    RepoDataRecord {
        url: url::Url::parse(&format!("feature://{feature}/")).unwrap(),
        channel: String::new(),
        file_name: format!("{name}-0-0.tar.bz2"),
        package_record,
    }
}
