use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{EntryPoint, PackageFile};

/// The python specific links of a noarch package.
#[derive(Serialize, Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct PythonEntryPoints {
    /// Commands that invoke python functions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<EntryPoint>,
}

/// The noarch-specific link information of a package.
#[derive(Serialize, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NoArchLinks {
    /// A `noarch: python` package with entry points.
    Python(PythonEntryPoints),
    /// A `noarch: generic` package, nothing special to do.
    Generic,
}

/// The parsed `info/link.json` of a noarch package. Older packages carry the
/// same content under `info/package_metadata.json`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkJson {
    /// Links for specific noarch packages.
    pub noarch: NoArchLinks,

    /// The version of the file format.
    pub package_metadata_version: u64,
}

impl PackageFile for LinkJson {
    fn package_path() -> &'static Path {
        Path::new("info/link.json")
    }

    fn from_str(str: &str) -> Result<Self, std::io::Error> {
        serde_json::from_str(str).map_err(Into::into)
    }
}

impl LinkJson {
    /// Reads the file from a package directory, falling back to the older
    /// `info/package_metadata.json` name. Returns `None` when neither file
    /// exists.
    pub fn from_package_directory_with_fallback(
        path: &Path,
    ) -> Result<Option<LinkJson>, std::io::Error> {
        match Self::from_package_directory(path) {
            Ok(link) => Ok(Some(link)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match Self::from_path(path.join("info/package_metadata.json")) {
                    Ok(link) => Ok(Some(link)),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{LinkJson, NoArchLinks, PackageFile};

    const LINK_JSON: &str = r#"{
        "noarch": {
            "type": "python",
            "entry_points": ["spiffy = spiffy.cli:main"]
        },
        "package_metadata_version": 1
    }"#;

    #[test]
    fn parse() {
        let link: LinkJson = PackageFile::from_str(LINK_JSON).unwrap();
        assert_eq!(link.package_metadata_version, 1);
        match &link.noarch {
            NoArchLinks::Python(links) => {
                assert_eq!(links.entry_points.len(), 1);
                assert_eq!(links.entry_points[0].command, "spiffy");
            }
            NoArchLinks::Generic => panic!("expected python links"),
        }
    }

    #[test]
    fn fallback_to_package_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let info = dir.path().join("info");
        std::fs::create_dir_all(&info).unwrap();
        std::fs::write(info.join("package_metadata.json"), LINK_JSON).unwrap();

        let link = LinkJson::from_package_directory_with_fallback(dir.path())
            .unwrap()
            .unwrap();
        assert!(matches!(link.noarch, NoArchLinks::Python(_)));

        let empty = tempfile::tempdir().unwrap();
        assert!(LinkJson::from_package_directory_with_fallback(empty.path())
            .unwrap()
            .is_none());
    }
}
