use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use krait_digest::serde::HexDigest;
use krait_digest::Sha256Hash;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::has_prefix::HasPrefixEntry;
use super::{Files, HasPrefix, NoLink, NoSoftlink, PackageFile};

/// The parsed `info/paths.json` of a package: one entry per file the package
/// installs, with the instructions for installing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsJson {
    /// The version of the file format.
    pub paths_version: u64,

    /// All files included in the package.
    pub paths: Vec<PathsEntry>,
}

impl PackageFile for PathsJson {
    fn package_path() -> &'static Path {
        Path::new("info/paths.json")
    }

    fn from_str(str: &str) -> Result<Self, std::io::Error> {
        serde_json::from_str(str).map_err(Into::into)
    }
}

impl PathsJson {
    /// Reads the file from an extracted package directory. If the
    /// `paths.json` file is missing this tries to reconstruct it from the
    /// deprecated files old packages carry instead.
    pub fn from_package_directory_with_deprecated_fallback(
        path: &Path,
    ) -> Result<Self, std::io::Error> {
        match Self::from_package_directory(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Self::from_deprecated_package_directory(path)
            }
            result => result,
        }
    }

    /// Reconstructs the information from the deprecated `files`,
    /// `has_prefix`, `no_link` and `no_softlink` files of very old packages.
    pub fn from_deprecated_package_directory(path: &Path) -> Result<Self, std::io::Error> {
        let files = Files::from_package_directory(path)?;
        let has_prefix = read_optional::<HasPrefix>(path)?;
        let no_link = read_optional::<NoLink>(path)?;
        let no_softlink = read_optional::<NoSoftlink>(path)?;

        let no_link: HashSet<PathBuf> = no_link
            .into_iter()
            .flat_map(|f| f.files)
            .chain(no_softlink.into_iter().flat_map(|f| f.files))
            .collect();

        let has_prefix: HashMap<PathBuf, HasPrefixEntry> = has_prefix
            .into_iter()
            .flat_map(|f| f.files)
            .map(|entry| (entry.relative_path.clone(), entry))
            .collect();

        let paths = files
            .files
            .into_iter()
            .map(|relative_path| {
                let prefix = has_prefix.get(&relative_path);
                let metadata = path.join(&relative_path).symlink_metadata()?;
                let path_type = if metadata.is_symlink() {
                    PathType::SoftLink
                } else if metadata.is_dir() {
                    PathType::Directory
                } else {
                    PathType::HardLink
                };
                Ok(PathsEntry {
                    path_type,
                    file_mode: prefix.map(|entry| entry.file_mode).unwrap_or_default(),
                    prefix_placeholder: prefix.map(|entry| entry.prefix.clone()),
                    no_link: no_link.contains(&relative_path),
                    sha256: None,
                    size_in_bytes: None,
                    relative_path,
                })
            })
            .collect::<Result<_, std::io::Error>>()?;

        Ok(Self {
            paths,
            paths_version: 1,
        })
    }
}

fn read_optional<T: PackageFile>(path: &Path) -> Result<Option<T>, std::io::Error> {
    match T::from_package_directory(path) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl FromStr for PathsJson {
    type Err = std::io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(Into::into)
    }
}

/// A single file to be installed from a package.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct PathsEntry {
    /// The path of the file relative to the root of the package.
    #[serde(rename = "_path")]
    #[serde_as(as = "crate::utils::serde::NormalizedPath")]
    pub relative_path: PathBuf,

    /// How the file should be installed.
    pub path_type: PathType,

    /// Whether the file is a text or binary file, relevant when a prefix
    /// placeholder has to be rewritten.
    #[serde(default, skip_serializing_if = "FileMode::is_binary")]
    pub file_mode: FileMode,

    /// The build-time placeholder string embedded in the file, if any. Files
    /// with a placeholder are always copied and rewritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_placeholder: Option<String>,

    /// Whether this file must not be hard- or soft-linked into the prefix.
    #[serde(
        default = "no_link_default",
        skip_serializing_if = "is_no_link_default"
    )]
    pub no_link: bool,

    /// The SHA256 hash of the file contents.
    #[serde_as(as = "Option<HexDigest<krait_digest::Sha256>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Sha256Hash>,

    /// The size of the file in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_in_bytes: Option<u64>,
}

/// Whether a file with a prefix placeholder is rewritten textually or as a
/// NUL-padded binary string.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    /// Padded binary replacement.
    Binary,
    /// Plain text replacement.
    Text,
}

impl Default for FileMode {
    fn default() -> Self {
        FileMode::Binary
    }
}

impl FileMode {
    /// Returns true for binary mode.
    pub fn is_binary(&self) -> bool {
        matches!(self, FileMode::Binary)
    }
}

/// How an entry is stored inside the package archive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    /// A regular file.
    HardLink,
    /// A symbolic link.
    SoftLink,
    /// A directory.
    Directory,
}

fn no_link_default() -> bool {
    false
}

fn is_no_link_default(value: &bool) -> bool {
    *value == no_link_default()
}

#[cfg(test)]
mod test {
    use super::{FileMode, PathType, PathsJson};
    use std::path::PathBuf;

    const PATHS_JSON: &str = r#"{
        "paths": [
            {
                "_path": "bin/spiffy",
                "path_type": "hardlink",
                "sha256": "1154fceeb5c4ee9bb97d245713ac21eb1910237c724d2b7103747215663273c2",
                "size_in_bytes": 23
            },
            {
                "_path": "etc/spiffy.cfg",
                "file_mode": "text",
                "path_type": "hardlink",
                "prefix_placeholder": "/opt/placeholder",
                "sha256": "2ef00c82b0e9e45978d7a12c5d0f02f28e0d913a2ee8aff9ce1b99022b0b0b3e",
                "size_in_bytes": 48
            },
            {
                "_path": "share/empty",
                "path_type": "directory"
            }
        ],
        "paths_version": 1
    }"#;

    #[test]
    fn deserialize() {
        let paths: PathsJson = PATHS_JSON.parse().unwrap();
        assert_eq!(paths.paths_version, 1);
        assert_eq!(paths.paths.len(), 3);

        let first = &paths.paths[0];
        assert_eq!(first.relative_path, PathBuf::from("bin/spiffy"));
        assert_eq!(first.path_type, PathType::HardLink);
        assert_eq!(first.file_mode, FileMode::Binary);
        assert!(first.sha256.is_some());

        let second = &paths.paths[1];
        assert_eq!(second.file_mode, FileMode::Text);
        assert_eq!(second.prefix_placeholder.as_deref(), Some("/opt/placeholder"));

        assert_eq!(paths.paths[2].path_type, PathType::Directory);
    }

    #[test]
    fn roundtrip() {
        let paths: PathsJson = PATHS_JSON.parse().unwrap();
        let json = serde_json::to_string(&paths).unwrap();
        let reparsed: PathsJson = json.parse().unwrap();
        assert_eq!(paths, reparsed);
    }

    #[test]
    fn reconstruct_from_deprecated_files() {
        let dir = tempfile::tempdir().unwrap();
        let info = dir.path().join("info");
        std::fs::create_dir_all(&info).unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/tool"), b"#!/bin/sh\n").unwrap();
        std::fs::write(info.join("files"), "bin/tool\n").unwrap();
        std::fs::write(info.join("no_link"), "bin/tool\n").unwrap();

        let paths = PathsJson::from_package_directory_with_deprecated_fallback(dir.path()).unwrap();
        assert_eq!(paths.paths.len(), 1);
        assert_eq!(paths.paths[0].relative_path, PathBuf::from("bin/tool"));
        assert!(paths.paths[0].no_link);
        assert_eq!(paths.paths[0].path_type, PathType::HardLink);
    }
}
