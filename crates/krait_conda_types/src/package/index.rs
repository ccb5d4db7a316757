use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none};

use super::PackageFile;
use crate::utils::serde::{FeatureSet, Timestamp};
use crate::{NoArchType, PackageName, Version};

/// The parsed `info/index.json` of a package archive. It mirrors the record
/// the package has in repodata.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
pub struct IndexJson {
    /// Optionally, the architecture the package is built for.
    pub arch: Option<String>,

    /// The build string of the package.
    pub build: String,

    /// The build number of the package.
    pub build_number: u64,

    /// The package constraints of the package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constrains: Vec<String>,

    /// The dependencies of the package.
    #[serde(default)]
    pub depends: Vec<String>,

    /// Features this package provides.
    #[serde_as(as = "Option<FeatureSet>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,

    /// Optionally, the license.
    pub license: Option<String>,

    /// Optionally, the license family.
    pub license_family: Option<String>,

    /// The lowercase name of the package.
    pub name: PackageName,

    /// The way in which the package is independent of architecture.
    #[serde(default, skip_serializing_if = "NoArchType::is_none")]
    pub noarch: NoArchType,

    /// Optionally, the OS the package is built for.
    pub platform: Option<String>,

    /// The subdirectory that contains this package.
    pub subdir: Option<String>,

    /// The timestamp when this package was created.
    #[serde_as(as = "Option<Timestamp>")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// Features that installing this package activates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde_as(as = "FeatureSet")]
    pub track_features: Vec<String>,

    /// The version of the package.
    pub version: Version,
}

impl PackageFile for IndexJson {
    fn package_path() -> &'static Path {
        Path::new("info/index.json")
    }

    fn from_str(str: &str) -> Result<Self, std::io::Error> {
        serde_json::from_str(str).map_err(Into::into)
    }
}

#[cfg(test)]
mod test {
    use super::{IndexJson, PackageFile};

    #[test]
    fn parse() {
        let index: IndexJson = PackageFile::from_str(
            r#"{
                "arch": "x86_64",
                "build": "py36h1af98f8_1",
                "build_number": 1,
                "depends": ["python >=3.6,<3.7.0a0"],
                "license": "MIT",
                "name": "foo",
                "platform": "linux",
                "subdir": "linux-64",
                "timestamp": 1605110689658,
                "version": "3.0.2"
            }"#,
        )
        .unwrap();
        assert_eq!(index.name.as_normalized(), "foo");
        assert_eq!(index.build_number, 1);
        assert_eq!(index.subdir.as_deref(), Some("linux-64"));
        assert!(index.noarch.is_none());
    }

    #[test]
    fn parse_noarch_python() {
        let index: IndexJson = PackageFile::from_str(
            r#"{
                "build": "pyhd8ed1ab_0",
                "build_number": 0,
                "depends": ["python >=3.6"],
                "name": "pytweening",
                "noarch": "python",
                "subdir": "noarch",
                "version": "1.0.4"
            }"#,
        )
        .unwrap();
        assert!(index.noarch.is_python());
    }
}
