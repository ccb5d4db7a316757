use std::path::{Path, PathBuf};

use super::PackageFile;

/// The deprecated `info/files` file: a plain list of the files a package
/// installs, one path per line. Replaced by `paths.json` but still found in
/// old archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Files {
    /// The files in the package.
    pub files: Vec<PathBuf>,
}

impl PackageFile for Files {
    fn package_path() -> &'static Path {
        Path::new("info/files")
    }

    fn from_str(str: &str) -> Result<Self, std::io::Error> {
        Ok(Self {
            files: str
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .collect(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Files, PackageFile};
    use std::path::PathBuf;

    #[test]
    fn parse() {
        let files = Files::from_str("bin/foo\nlib/libfoo.so\n\n").unwrap();
        assert_eq!(
            files.files,
            vec![PathBuf::from("bin/foo"), PathBuf::from("lib/libfoo.so")]
        );
    }
}
