use std::path::{Path, PathBuf};

use super::PackageFile;

/// The deprecated `info/no_link` file: files that must never be linked,
/// always copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoLink {
    /// The files that must not be linked.
    pub files: Vec<PathBuf>,
}

impl PackageFile for NoLink {
    fn package_path() -> &'static Path {
        Path::new("info/no_link")
    }

    fn from_str(str: &str) -> Result<Self, std::io::Error> {
        Ok(Self {
            files: parse_lines(str),
        })
    }
}

/// The deprecated `info/no_softlink` file: files that must not be soft
/// linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoSoftlink {
    /// The files that must not be soft linked.
    pub files: Vec<PathBuf>,
}

impl PackageFile for NoSoftlink {
    fn package_path() -> &'static Path {
        Path::new("info/no_softlink")
    }

    fn from_str(str: &str) -> Result<Self, std::io::Error> {
        Ok(Self {
            files: parse_lines(str),
        })
    }
}

fn parse_lines(str: &str) -> Vec<PathBuf> {
    str.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}
