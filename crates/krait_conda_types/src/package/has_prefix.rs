use std::path::{Path, PathBuf};

use super::paths::FileMode;
use super::PackageFile;

/// The placeholder very old packages use when no explicit placeholder is
/// recorded in `has_prefix`.
const LEGACY_PLACEHOLDER: &str = "/opt/anaconda1anaconda2anaconda3";

/// The deprecated `info/has_prefix` file, listing the files that embed the
/// build prefix. Replaced by the `prefix_placeholder` fields of
/// `paths.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasPrefix {
    /// The files with an embedded prefix.
    pub files: Vec<HasPrefixEntry>,
}

/// A single line of a `has_prefix` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasPrefixEntry {
    /// The placeholder embedded in the file.
    pub prefix: String,

    /// Whether the replacement is textual or binary.
    pub file_mode: FileMode,

    /// The path of the file, relative to the package root.
    pub relative_path: PathBuf,
}

impl PackageFile for HasPrefix {
    fn package_path() -> &'static Path {
        Path::new("info/has_prefix")
    }

    fn from_str(str: &str) -> Result<Self, std::io::Error> {
        let mut files = Vec::new();
        for line in str.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Lines are either `<placeholder> <mode> <path>` or just
            // `<path>` with the legacy placeholder implied.
            let fields: Vec<&str> = split_fields(line);
            let entry = match fields.as_slice() {
                [prefix, mode, path] => HasPrefixEntry {
                    prefix: (*prefix).to_owned(),
                    file_mode: match *mode {
                        "text" => FileMode::Text,
                        _ => FileMode::Binary,
                    },
                    relative_path: PathBuf::from(path),
                },
                [path] => HasPrefixEntry {
                    prefix: LEGACY_PLACEHOLDER.to_owned(),
                    file_mode: FileMode::Text,
                    relative_path: PathBuf::from(path),
                },
                _ => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("malformed has_prefix line: '{line}'"),
                    ))
                }
            };
            files.push(entry);
        }
        Ok(Self { files })
    }
}

/// Splits a has_prefix line into fields, honoring double quotes around
/// fields that contain spaces.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut rest = line.trim();
    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => {
                    fields.push(&quoted[..end]);
                    rest = quoted[end + 1..].trim_start();
                }
                None => {
                    fields.push(quoted);
                    rest = "";
                }
            }
        } else {
            match rest.find(char::is_whitespace) {
                Some(end) => {
                    fields.push(&rest[..end]);
                    rest = rest[end..].trim_start();
                }
                None => {
                    fields.push(rest);
                    rest = "";
                }
            }
        }
    }
    fields
}

#[cfg(test)]
mod test {
    use super::{FileMode, HasPrefix, PackageFile, LEGACY_PLACEHOLDER};
    use std::path::PathBuf;

    #[test]
    fn parse_full_lines() {
        let has_prefix =
            HasPrefix::from_str("/opt/placeholder text etc/config\n/opt/placeholder binary bin/tool\n")
                .unwrap();
        assert_eq!(has_prefix.files.len(), 2);
        assert_eq!(has_prefix.files[0].prefix, "/opt/placeholder");
        assert_eq!(has_prefix.files[0].file_mode, FileMode::Text);
        assert_eq!(
            has_prefix.files[0].relative_path,
            PathBuf::from("etc/config")
        );
        assert_eq!(has_prefix.files[1].file_mode, FileMode::Binary);
    }

    #[test]
    fn parse_legacy_lines() {
        let has_prefix = HasPrefix::from_str("bin/tool\n").unwrap();
        assert_eq!(has_prefix.files[0].prefix, LEGACY_PLACEHOLDER);
        assert_eq!(has_prefix.files[0].file_mode, FileMode::Text);
    }

    #[test]
    fn parse_quoted_placeholder() {
        let has_prefix =
            HasPrefix::from_str("\"/opt/path with spaces\" text etc/config\n").unwrap();
        assert_eq!(has_prefix.files[0].prefix, "/opt/path with spaces");
    }
}
