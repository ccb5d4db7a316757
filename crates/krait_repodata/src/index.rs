//! Assembly of the solver index from per-channel repodata.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use fxhash::FxHashSet;
use krait_conda_types::{
    Channel, PackageName, PackageRecord, Platform, RepoDataRecord, Version,
};
use url::Url;

use crate::fetch::{fetch_repo_data, FetchRepoDataError};

/// A channel failed to load. The partial results of that channel are
/// discarded; other channels remain usable by the caller.
#[derive(Debug, thiserror::Error)]
#[error("failed to load channel '{channel}' from {url}")]
pub struct ChannelError {
    /// The canonical name of the channel.
    pub channel: String,

    /// The subdirectory url that failed.
    pub url: Url,

    /// The underlying fetch failure.
    #[source]
    pub source: FetchRepoDataError,
}

/// The merged package index of all configured channels.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// All package records, deduplicated across channels.
    pub records: Vec<RepoDataRecord>,

    /// The canonical channel names in priority order (highest first).
    pub channel_order: Vec<String>,
}

impl Index {
    /// Returns the priority rank of a record's channel: 0 is the highest
    /// priority channel, unknown channels sort last.
    pub fn channel_rank(&self, record: &RepoDataRecord) -> usize {
        self.channel_order
            .iter()
            .position(|channel| channel == &record.channel)
            .unwrap_or(self.channel_order.len())
    }
}

/// Loads and merges the repodata of the given channels and platforms.
///
/// Channels are queried in the given order, which also defines channel
/// priority. A record that appears in multiple channels with the same
/// (subdir, name, version, build) identity is kept only for the first
/// channel that provides it. Synthetic `@feature` records are added for
/// every feature name that appears in the index, so the solver can treat
/// "feature is active" as a package variable.
pub async fn load_index(
    client: &reqwest::Client,
    channels: &[Channel],
    platforms: &[Platform],
    cache_dir: &Path,
) -> Result<Index, ChannelError> {
    let mut index = Index::default();
    let mut seen = FxHashSet::default();

    for channel in channels {
        index.channel_order.push(channel.canonical_name());

        // A channel is merged only when all of its subdirectories loaded;
        // failing halfway discards the partial results of that channel.
        let mut staged = Vec::new();
        for &platform in platforms {
            let subdir_url = channel.platform_url(platform);
            let repodata = match fetch_repo_data(client, &subdir_url, cache_dir).await {
                Ok(repodata) => repodata,
                // A missing subdir is normal (not every channel builds for
                // every platform); anything else fails the channel.
                Err(FetchRepoDataError::NotFound(_)) => {
                    tracing::debug!("{subdir_url} does not exist, skipping");
                    continue;
                }
                Err(source) => {
                    return Err(ChannelError {
                        channel: channel.canonical_name(),
                        url: subdir_url,
                        source,
                    })
                }
            };
            staged.extend(repodata.into_repo_data_records(channel));
        }

        for record in staged {
            let key = (
                record.package_record.subdir.clone(),
                record.package_record.name.as_normalized().to_owned(),
                record.package_record.version.to_string(),
                record.package_record.build.clone(),
            );
            // First channel wins for identical records.
            if seen.insert(key) {
                index.records.push(record);
            }
        }
    }

    add_feature_records(&mut index.records);
    Ok(index)
}

/// Inserts one synthetic record per feature name found in the index. The
/// records are named `@<feature>` so they can never collide with real
/// packages, and carry no dependencies.
pub fn add_feature_records(records: &mut Vec<RepoDataRecord>) {
    let features: BTreeSet<String> = records
        .iter()
        .flat_map(|record| {
            record
                .package_record
                .track_features
                .iter()
                .chain(record.package_record.features.iter().flatten())
        })
        .cloned()
        .collect();

    for feature in features {
        records.push(make_feature_record(&feature));
    }
}

/// Builds the synthetic record that represents "feature `<name>` is on".
pub fn make_feature_record(feature: &str) -> RepoDataRecord {
    let name = format!("@{feature}");
    let mut package_record = PackageRecord::new(
        PackageName::new_unchecked(name.clone()),
        Version::from_str("0").expect("'0' is a valid version"),
        "0".to_owned(),
    );
    package_record.subdir = "noarch".to_owned();
    package_record.track_features = vec![feature.to_owned()];

    RepoDataRecord {
        url: Url::parse(&format!("feature://{feature}/"))
            .expect("feature names form valid urls"),
        channel: String::new(),
        file_name: format!("{name}-0-0.tar.bz2"),
        package_record,
    }
}
