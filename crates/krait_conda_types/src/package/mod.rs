//! Models of the files found in the `info/` directory of a package archive.

mod archive_identifier;
mod archive_type;
mod entry_point;
mod files;
mod has_prefix;
mod index;
mod link;
mod no_link;
mod paths;

use std::fs::File;
use std::io::Read;
use std::path::Path;

pub use archive_identifier::ArchiveIdentifier;
pub use archive_type::ArchiveType;
pub use entry_point::EntryPoint;
pub use files::Files;
pub use has_prefix::{HasPrefix, HasPrefixEntry};
pub use index::IndexJson;
pub use link::{LinkJson, NoArchLinks, PythonEntryPoints};
pub use no_link::{NoLink, NoSoftlink};
pub use paths::{FileMode, PathType, PathsEntry, PathsJson};

/// A file with a fixed location inside a package archive, e.g.
/// `info/index.json`.
pub trait PackageFile: Sized {
    /// The path of the file relative to the root of the archive.
    fn package_path() -> &'static Path;

    /// Parses the file contents.
    fn from_str(str: &str) -> Result<Self, std::io::Error>;

    /// Parses the object from a reader.
    fn from_reader(mut reader: impl Read) -> Result<Self, std::io::Error> {
        let mut str = String::new();
        reader.read_to_string(&mut str)?;
        Self::from_str(&str)
    }

    /// Parses the object from the file at `path`.
    fn from_path(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        Self::from_reader(File::open(path.as_ref())?)
    }

    /// Parses the object by looking up its well-known path inside an
    /// extracted package directory.
    fn from_package_directory(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        Self::from_path(path.as_ref().join(Self::package_path()))
    }
}
