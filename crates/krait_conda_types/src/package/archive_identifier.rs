use std::fmt::{Display, Formatter};
use std::path::Path;

use url::Url;

use super::ArchiveType;

/// The name, version and build string encoded in a package archive filename.
///
/// Archive filenames have the form `<name>-<version>-<build><ext>`, which
/// also names the cache directory the archive extracts to.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ArchiveIdentifier {
    /// The name of the package.
    pub name: String,
    /// The version of the package.
    pub version: String,
    /// The build string of the package.
    pub build_string: String,
    /// The archive type.
    pub archive_type: ArchiveType,
}

impl ArchiveIdentifier {
    /// Returns the filename for this identifier.
    pub fn to_file_name(&self) -> String {
        self.to_string()
    }

    /// The directory name the archive extracts to:
    /// `<name>-<version>-<build>`.
    pub fn dist_str(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.build_string)
    }

    /// Tries to recover the identifier from a filename.
    pub fn try_from_filename(filename: &str) -> Option<Self> {
        let (stem, archive_type) = ArchiveType::split_str(filename)?;

        // Walk backwards: the last two dashes separate build and version.
        let mut parts = stem.rsplitn(3, '-');
        let build_string = parts.next()?;
        let version = parts.next()?;
        let name = parts.next()?;
        if name.is_empty() || version.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_owned(),
            version: version.to_owned(),
            build_string: build_string.to_owned(),
            archive_type,
        })
    }

    /// Tries to recover the identifier from a path.
    pub fn try_from_path(path: impl AsRef<Path>) -> Option<Self> {
        Self::try_from_filename(path.as_ref().file_name()?.to_str()?)
    }

    /// Tries to recover the identifier from the last segment of a url.
    pub fn try_from_url(url: &Url) -> Option<Self> {
        let filename = url.path_segments().and_then(Iterator::last)?;
        Self::try_from_filename(filename)
    }
}

impl Display for ArchiveIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}{}",
            &self.name,
            &self.version,
            &self.build_string,
            self.archive_type.extension()
        )
    }
}
