//! Defines [`PrefixRecord`], the on-disk description of one installed
//! package inside a prefix.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use krait_digest::serde::HexDigest;
use krait_digest::Sha256Hash;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use serde_with::serde_as;

use crate::package::FileMode;
use crate::{PackageRecord, RepoDataRecord};

/// Information about every file that was installed for a package.
///
/// This mirrors the shape of the package's `info/paths.json`, but describes
/// the files as they ended up in the prefix rather than the instructions for
/// installing them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixPaths {
    /// The version of the file format.
    pub paths_version: u64,

    /// The entries, one per installed file.
    #[serde(default)]
    pub paths: Vec<PathsEntry>,
}

impl Default for PrefixPaths {
    fn default() -> Self {
        Self {
            paths_version: 1,
            paths: Vec::default(),
        }
    }
}

impl From<Vec<PathsEntry>> for PrefixPaths {
    fn from(paths: Vec<PathsEntry>) -> Self {
        Self {
            paths,
            ..Default::default()
        }
    }
}

/// A single file installed for a package.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct PathsEntry {
    /// The path relative to the root of the prefix.
    #[serde(rename = "_path")]
    #[serde_as(as = "crate::utils::serde::NormalizedPath")]
    pub relative_path: PathBuf,

    /// How the file was installed into the prefix.
    pub path_type: PathType,

    /// The SHA256 hash of the original file in the package.
    #[serde_as(as = "Option<HexDigest<krait_digest::Sha256>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Sha256Hash>,

    /// The SHA256 hash of the file as it exists in the prefix. Differs from
    /// `sha256` when the prefix placeholder was rewritten.
    #[serde_as(as = "Option<HexDigest<krait_digest::Sha256>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_in_prefix: Option<Sha256Hash>,

    /// The size of the installed file in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_in_bytes: Option<u64>,

    /// The file mode used for placeholder rewriting, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_mode: Option<FileMode>,

    /// The placeholder string that was replaced when the file was installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_placeholder: Option<String>,
}

/// How a file landed in the prefix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    /// A hard link into the package cache.
    #[serde(rename = "hardlink")]
    HardLink,
    /// A soft link.
    #[serde(rename = "softlink")]
    SoftLink,
    /// An explicitly created (possibly empty) directory.
    Directory,
    /// A `.pyc` file compiled at install time for a noarch python package.
    PycFile,
    /// A python entry point script created at install time (unix).
    UnixPythonEntryPoint,
    /// A python entry point script created at install time (windows).
    WindowsPythonEntryPointScript,
    /// The windows launcher executable belonging to an entry point script.
    WindowsPythonEntryPointExe,
}

impl From<crate::package::PathType> for PathType {
    fn from(ty: crate::package::PathType) -> Self {
        match ty {
            crate::package::PathType::HardLink => PathType::HardLink,
            crate::package::PathType::SoftLink => PathType::SoftLink,
            crate::package::PathType::Directory => PathType::Directory,
        }
    }
}

/// The way a file was linked from the package cache into the prefix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr, Hash)]
#[repr(u8)]
pub enum LinkType {
    /// The file shares an inode with the cache.
    HardLink = 1,
    /// The file is a symbolic link to the cache.
    SoftLink = 2,
    /// The file is a full copy.
    Copy = 3,
    /// A directory.
    Directory = 4,
}

/// A reference to the package cache entry a record was linked from.
#[derive(Debug, Deserialize, Serialize, Eq, PartialEq, Clone)]
pub struct Link {
    /// The path of the extracted package directory the files came from.
    pub source: PathBuf,

    /// The link type that was used to install the files.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
}

/// One installed package within a prefix: the repodata record it came from,
/// plus everything the installation added.
///
/// Stored as `<prefix>/conda-meta/<name>-<version>-<build>.json`. Records are
/// never updated in place; a package upgrade writes a new record and removes
/// the old one.
#[serde_as]
#[derive(Debug, Deserialize, Serialize, Eq, PartialEq, Clone)]
pub struct PrefixRecord {
    /// The record from the repodata this package was solved from.
    #[serde(flatten)]
    pub repodata_record: RepoDataRecord,

    /// Where the downloaded archive is stored, if it was kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_tarball_full_path: Option<PathBuf>,

    /// The extracted package directory the files were linked from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_package_dir: Option<PathBuf>,

    /// The short paths of every file installed for this package, sorted.
    #[serde(default)]
    #[serde_as(as = "Vec<crate::utils::serde::NormalizedPath>")]
    pub files: Vec<PathBuf>,

    /// Per-file installation details.
    #[serde(default)]
    pub paths_data: PrefixPaths,

    /// The cache entry the files were linked from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,

    /// The spec string the user requested when this package was installed,
    /// if it was requested explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_spec: Option<String>,
}

impl PrefixRecord {
    /// Creates a `PrefixRecord` from a `RepoDataRecord` and installation
    /// results.
    pub fn from_repodata_record(
        repodata_record: RepoDataRecord,
        package_tarball_full_path: Option<PathBuf>,
        extracted_package_dir: Option<PathBuf>,
        paths: Vec<PathsEntry>,
        requested_spec: Option<String>,
        link: Option<Link>,
    ) -> Self {
        let mut files: Vec<PathBuf> = paths
            .iter()
            .map(|entry| entry.relative_path.clone())
            .collect();
        files.sort();
        Self {
            repodata_record,
            package_tarball_full_path,
            extracted_package_dir,
            files,
            paths_data: paths.into(),
            link,
            requested_spec,
        }
    }

    /// Parses a prefix record from a reader.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, std::io::Error> {
        let mut str = String::new();
        reader.read_to_string(&mut str)?;
        Self::from_str(&str)
    }

    /// Parses a prefix record from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        Self::from_reader(File::open(path.as_ref())?)
    }

    /// The canonical file name of this record:
    /// `<name>-<version>-<build>.json`.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.repodata_record.package_record.dist_str())
    }

    /// Writes this record to the given path.
    pub fn write_to_path(&self, path: impl AsRef<Path>, pretty: bool) -> Result<(), std::io::Error> {
        self.write_to(File::create(path.as_ref())?, pretty)
    }

    /// Writes this record to the given writer.
    pub fn write_to(&self, writer: impl std::io::Write, pretty: bool) -> Result<(), std::io::Error> {
        if pretty {
            serde_json::to_writer_pretty(BufWriter::new(writer), self)?;
        } else {
            serde_json::to_writer(BufWriter::new(writer), self)?;
        }
        Ok(())
    }

    /// Reads all prefix records from the `conda-meta` directory of a prefix.
    pub fn collect_from_prefix(prefix: &Path) -> Result<Vec<PrefixRecord>, std::io::Error> {
        let conda_meta_path = prefix.join("conda-meta");
        if !conda_meta_path.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs_err::read_dir(&conda_meta_path)? {
            let entry = entry?;
            if entry.file_type()?.is_file()
                && entry.file_name().to_string_lossy().ends_with(".json")
            {
                records.push(Self::from_path(&entry.path())?);
            }
        }
        Ok(records)
    }
}

impl FromStr for PrefixRecord {
    type Err = std::io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(Into::into)
    }
}

impl AsRef<RepoDataRecord> for PrefixRecord {
    fn as_ref(&self) -> &RepoDataRecord {
        &self.repodata_record
    }
}

impl AsRef<PackageRecord> for PrefixRecord {
    fn as_ref(&self) -> &PackageRecord {
        &self.repodata_record.package_record
    }
}
