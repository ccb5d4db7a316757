/// The file format of a package archive.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ArchiveType {
    /// A bzip2 compressed tarball (`.tar.bz2`), the format this tool
    /// installs.
    TarBz2,
    /// The newer `.conda` format. Recognized in filenames but not extracted.
    Conda,
}

impl ArchiveType {
    /// Splits an archive extension off a filename, returning the stem and
    /// the recognized type.
    pub fn split_str(path: &str) -> Option<(&str, ArchiveType)> {
        if let Some(path) = path.strip_suffix(".tar.bz2") {
            Some((path, ArchiveType::TarBz2))
        } else {
            path.strip_suffix(".conda")
                .map(|path| (path, ArchiveType::Conda))
        }
    }

    /// Tries to determine the type of a conda archive from its filename.
    pub fn try_from(path: impl AsRef<str>) -> Option<ArchiveType> {
        Self::split_str(path.as_ref()).map(|(_, ty)| ty)
    }

    /// Returns the file extension of the archive type, including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveType::TarBz2 => ".tar.bz2",
            ArchiveType::Conda => ".conda",
        }
    }
}

#[cfg(test)]
mod test {
    use super::ArchiveType;

    #[test]
    fn split() {
        assert_eq!(
            ArchiveType::split_str("foo-1.0-0.tar.bz2"),
            Some(("foo-1.0-0", ArchiveType::TarBz2))
        );
        assert_eq!(
            ArchiveType::split_str("foo-1.0-0.conda"),
            Some(("foo-1.0-0", ArchiveType::Conda))
        );
        assert_eq!(ArchiveType::split_str("foo-1.0-0.zip"), None);
    }
}
