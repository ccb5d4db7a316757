//! Defines [`RepoDataRecord`]: a [`PackageRecord`] plus where it came from.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::PackageRecord;

/// Information about a package from repodata, together with its origin: the
/// canonical channel name, the filename within the subdirectory, and the full
/// download url.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq, Hash)]
pub struct RepoDataRecord {
    /// The data stored in the repodata.json.
    #[serde(flatten)]
    pub package_record: PackageRecord,

    /// The filename of the package archive.
    #[serde(rename = "fn")]
    pub file_name: String,

    /// The url from which the package can be downloaded.
    pub url: Url,

    /// The canonical name of the channel the package came from.
    pub channel: String,
}

impl AsRef<PackageRecord> for RepoDataRecord {
    fn as_ref(&self) -> &PackageRecord {
        &self.package_record
    }
}
