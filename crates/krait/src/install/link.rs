//! Linking a single file from an extracted package into a prefix.
//!
//! Files land in the prefix as hard links, soft links or copies, per the
//! configured policy and what the filesystem supports. Files that embed the
//! build-time placeholder prefix are always copied, rewriting the
//! placeholder to the destination prefix on the way: plain text replacement
//! for text files, NUL-padded c-string replacement for binaries.

use std::borrow::Cow;
use std::fmt::{self, Formatter};
use std::io::{ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};

use krait_conda_types::package::{FileMode, PathType, PathsEntry};
use krait_conda_types::Platform;
use krait_digest::{HashingWriter, Sha256};
use memmap2::Mmap;

/// The way a file is materialized in the prefix.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LinkMethod {
    /// A hard link to the file in the package cache.
    Hardlink,
    /// A symbolic link.
    Softlink,
    /// A full copy.
    Copy,
    /// A copy whose embedded placeholder prefix was rewritten.
    Patched(FileMode),
}

impl fmt::Display for LinkMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinkMethod::Hardlink => write!(f, "hardlink"),
            LinkMethod::Softlink => write!(f, "softlink"),
            LinkMethod::Copy => write!(f, "copy"),
            LinkMethod::Patched(FileMode::Binary) => write!(f, "binary patched"),
            LinkMethod::Patched(FileMode::Text) => write!(f, "text patched"),
        }
    }
}

/// An error that can occur while linking a single file.
#[derive(Debug, thiserror::Error)]
pub enum LinkFileError {
    /// A generic IO failure.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// The parent directory of the destination could not be created.
    #[error("failed to create parent directory")]
    FailedToCreateParentDirectory(#[source] std::io::Error),

    /// The source file could not be opened.
    #[error("could not open source file for reading")]
    FailedToOpenSourceFile(#[source] std::io::Error),

    /// The contents of a symlink could not be read.
    #[error("could not read symlink")]
    FailedToReadSymlink(#[source] std::io::Error),

    /// Linking the file failed.
    #[error("failed to {0} file to destination")]
    FailedToLink(LinkMethod, #[source] std::io::Error),

    /// The destination file could not be written.
    #[error("could not open destination file for writing")]
    FailedToOpenDestinationFile(#[source] std::io::Error),

    /// The destination file permissions could not be set.
    #[error("could not update destination file permissions")]
    FailedToUpdateDestinationFilePermissions(#[source] std::io::Error),

    /// The binary placeholder is shorter than the destination prefix, so an
    /// in-place rewrite would grow the file.
    #[error("the placeholder '{placeholder}' is too short to hold the target prefix '{target_prefix}'")]
    PaddingError {
        /// The placeholder embedded in the file.
        placeholder: String,
        /// The prefix that did not fit.
        target_prefix: String,
    },
}

/// The result of linking one file.
#[derive(Debug)]
pub struct LinkedFile {
    /// True when an existing file was replaced.
    pub clobbered: bool,

    /// The SHA256 of the file as it exists in the prefix.
    pub sha256: krait_digest::Sha256Hash,

    /// The size of the file in the prefix.
    pub file_size: u64,

    /// The method that was used.
    pub method: LinkMethod,
}

/// Installs a single file from `package_dir` to `destination_path` in the
/// prefix, rewriting the placeholder prefix when the entry carries one.
///
/// `target_prefix` is the string written into rewritten files; it usually
/// equals the prefix the file lands in.
#[allow(clippy::too_many_arguments)]
pub fn link_file(
    entry: &PathsEntry,
    package_dir: &Path,
    destination_path: &Path,
    target_prefix: &str,
    allow_symbolic_links: bool,
    allow_hard_links: bool,
    always_softlink: bool,
    platform: Platform,
) -> Result<LinkedFile, LinkFileError> {
    let source_path = package_dir.join(&entry.relative_path);

    if let Some(parent) = destination_path.parent() {
        if !parent.is_dir() {
            std::fs::create_dir_all(parent)
                .map_err(LinkFileError::FailedToCreateParentDirectory)?;
        }
    }

    // An existing destination means another package already put a file
    // there. The caller decides whether that is an error; here we just
    // replace and report.
    let clobbered = destination_path.is_file();

    let mut sha256 = None;
    let mut file_size = entry.size_in_bytes;

    let method = if let Some(placeholder) = entry.prefix_placeholder.as_deref() {
        // Backslashes in the replacement break string escaping in rewritten
        // text files, so the prefix is normalized to forward slashes on
        // windows.
        let target_prefix = if platform.is_windows() {
            Cow::Owned(target_prefix.replace('\\', "/"))
        } else {
            Cow::Borrowed(target_prefix)
        };

        let source = map_or_read_source_file(&source_path)?;
        let destination = std::fs::File::create(destination_path)
            .map_err(LinkFileError::FailedToOpenDestinationFile)?;
        let mut writer = HashingWriter::<_, Sha256>::new(destination);

        copy_and_replace_placeholder(
            source.as_ref(),
            &mut writer,
            placeholder,
            &target_prefix,
            entry.file_mode,
        )?;

        let (mut file, hash) = writer.finalize();
        sha256 = Some(hash);
        file_size = file.stream_position().ok();
        drop(file);

        // Rewritten copies keep the permissions of the original.
        let metadata = std::fs::symlink_metadata(&source_path)?;
        std::fs::set_permissions(destination_path, metadata.permissions())
            .map_err(LinkFileError::FailedToUpdateDestinationFilePermissions)?;

        LinkMethod::Patched(entry.file_mode)
    } else if entry.path_type == PathType::HardLink
        && always_softlink
        && allow_symbolic_links
        && !entry.no_link
    {
        // The always-softlink policy links regular files back into the
        // package cache.
        softlink_to_source(&source_path, destination_path)?;
        LinkMethod::Softlink
    } else if entry.path_type == PathType::HardLink && allow_hard_links && !entry.no_link {
        hardlink_to_destination(&source_path, destination_path)?;
        LinkMethod::Hardlink
    } else if entry.path_type == PathType::SoftLink && allow_symbolic_links && !entry.no_link {
        symlink_to_destination(&source_path, destination_path)?;
        LinkMethod::Softlink
    } else {
        copy_to_destination(&source_path, destination_path)?;
        LinkMethod::Copy
    };

    let sha256 = match (sha256, entry.sha256) {
        (Some(computed), _) => computed,
        (None, Some(recorded)) => recorded,
        (None, None) => krait_digest::compute_file_digest::<Sha256>(destination_path)?,
    };

    let file_size = match file_size {
        Some(size) => size,
        None => std::fs::symlink_metadata(destination_path)?.len(),
    };

    Ok(LinkedFile {
        clobbered,
        sha256,
        file_size,
        method,
    })
}

/// Either a memory mapped file or its contents read to memory. Mapping
/// fails on some filesystems; reading is the fallback.
enum MmapOrBytes {
    Mmap(Mmap),
    Bytes(Vec<u8>),
}

impl AsRef<[u8]> for MmapOrBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            MmapOrBytes::Mmap(mmap) => mmap.as_ref(),
            MmapOrBytes::Bytes(bytes) => bytes.as_slice(),
        }
    }
}

fn map_or_read_source_file(source_path: &Path) -> Result<MmapOrBytes, LinkFileError> {
    let mut file =
        std::fs::File::open(source_path).map_err(LinkFileError::FailedToOpenSourceFile)?;

    match unsafe { Mmap::map(&file) } {
        Ok(mmap) => Ok(MmapOrBytes::Mmap(mmap)),
        Err(err) => {
            tracing::warn!(
                "failed to memory map {}: {err}, reading into memory instead",
                source_path.display()
            );
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            Ok(MmapOrBytes::Bytes(bytes))
        }
    }
}

fn hardlink_to_destination(source: &Path, destination: &Path) -> Result<(), LinkFileError> {
    loop {
        match std::fs::hard_link(source, destination) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                std::fs::remove_file(destination)?;
            }
            Err(e) => return Err(LinkFileError::FailedToLink(LinkMethod::Hardlink, e)),
        }
    }
}

fn softlink_to_source(source: &Path, destination: &Path) -> Result<(), LinkFileError> {
    loop {
        match symlink(source, destination) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                std::fs::remove_file(destination)?;
            }
            Err(e) => return Err(LinkFileError::FailedToLink(LinkMethod::Softlink, e)),
        }
    }
}

fn symlink_to_destination(source: &Path, destination: &Path) -> Result<(), LinkFileError> {
    // Re-create the link with the same (usually relative) target rather
    // than linking to the cache copy.
    let link_target = source
        .read_link()
        .map_err(LinkFileError::FailedToReadSymlink)?;
    loop {
        match symlink(&link_target, destination) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                std::fs::remove_file(destination)?;
            }
            Err(e) => return Err(LinkFileError::FailedToLink(LinkMethod::Softlink, e)),
        }
    }
}

fn copy_to_destination(source: &Path, destination: &Path) -> Result<(), LinkFileError> {
    loop {
        match std::fs::copy(source, destination) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                std::fs::remove_file(destination)?;
            }
            Err(e) => return Err(LinkFileError::FailedToLink(LinkMethod::Copy, e)),
        }
    }
}

fn symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    #[cfg(windows)]
    return std::os::windows::fs::symlink_file(source, destination);
    #[cfg(unix)]
    return std::os::unix::fs::symlink(source, destination);
}

/// Copies `source_bytes` to `destination`, replacing every occurrence of
/// the placeholder with the target prefix according to the file mode.
pub fn copy_and_replace_placeholder(
    source_bytes: &[u8],
    destination: impl Write,
    placeholder: &str,
    target_prefix: &str,
    file_mode: FileMode,
) -> Result<(), LinkFileError> {
    match file_mode {
        FileMode::Text => {
            copy_and_replace_textual_placeholder(
                source_bytes,
                destination,
                placeholder,
                target_prefix,
            )?;
            Ok(())
        }
        FileMode::Binary => copy_and_replace_cstring_placeholder(
            source_bytes,
            destination,
            placeholder,
            target_prefix,
        ),
    }
}

/// Textual replacement: the file may change size.
pub fn copy_and_replace_textual_placeholder(
    mut source_bytes: &[u8],
    mut destination: impl Write,
    placeholder: &str,
    target_prefix: &str,
) -> Result<(), std::io::Error> {
    let old_prefix = placeholder.as_bytes();
    let new_prefix = target_prefix.as_bytes();

    loop {
        match memchr::memmem::find(source_bytes, old_prefix) {
            Some(index) => {
                destination.write_all(&source_bytes[..index])?;
                destination.write_all(new_prefix)?;
                source_bytes = &source_bytes[index + old_prefix.len()..];
            }
            None => {
                destination.write_all(source_bytes)?;
                return Ok(());
            }
        }
    }
}

/// Binary replacement: c-strings embedding the placeholder are rewritten in
/// place, padded with NULs so the file size is preserved.
///
/// The placeholder must be at least as long as the replacement — measured
/// against the full recorded placeholder, before any trailing NULs would be
/// stripped — otherwise the rewrite cannot fit and a
/// [`LinkFileError::PaddingError`] is raised.
pub fn copy_and_replace_cstring_placeholder(
    mut source_bytes: &[u8],
    mut destination: impl Write,
    placeholder: &str,
    target_prefix: &str,
) -> Result<(), LinkFileError> {
    let old_prefix = placeholder.as_bytes();
    let new_prefix = target_prefix.as_bytes();

    if new_prefix.len() > old_prefix.len() {
        return Err(LinkFileError::PaddingError {
            placeholder: placeholder.to_owned(),
            target_prefix: target_prefix.to_owned(),
        });
    }

    // Padding keeps every rewritten c-string the same length.
    let padding = vec![b'\0'; old_prefix.len() - new_prefix.len()];

    loop {
        match memchr::memmem::find(source_bytes, old_prefix) {
            Some(index) => {
                // The end of the c-string is the next NUL terminator.
                let mut end = index + old_prefix.len();
                while end < source_bytes.len() && source_bytes[end] != b'\0' {
                    end += 1;
                }
                let suffix = &source_bytes[index + old_prefix.len()..end];

                destination.write_all(&source_bytes[..index])?;
                destination.write_all(new_prefix)?;
                destination.write_all(suffix)?;
                destination.write_all(&padding)?;

                source_bytes = &source_bytes[end..];
            }
            None => {
                destination.write_all(source_bytes)?;
                return Ok(());
            }
        }
    }
}

/// Probes whether the prefix supports symlinks by creating one.
pub fn can_create_symlinks(target_dir: &Path) -> bool {
    let test_path = target_dir.join(format!(".symtest-{}", uuid::Uuid::new_v4().simple()));
    match symlink(Path::new("./"), &test_path) {
        Ok(()) => {
            let _ = std::fs::remove_file(&test_path);
            true
        }
        Err(_) => false,
    }
}

/// Probes whether hard links from the package cache into the prefix are
/// possible: they require both to live on the same filesystem.
pub fn can_create_hardlinks(target_dir: &Path, package_dir: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (
            std::fs::metadata(target_dir),
            std::fs::metadata(package_dir),
        ) {
            (Ok(a), Ok(b)) => a.dev() == b.dev(),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        match (target_dir.canonicalize(), package_dir.canonicalize()) {
            (Ok(a), Ok(b)) => a.components().next() == b.components().next(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{
        copy_and_replace_cstring_placeholder, copy_and_replace_textual_placeholder, LinkFileError,
    };
    use assert_matches::assert_matches;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case("Hello, cruel world!", "cruel", "fabulous", "Hello, fabulous world!")]
    #[case("/placeholder/bin:/placeholder/lib", "/placeholder", "/opt/env", "/opt/env/bin:/opt/env/lib")]
    #[case("nothing to do", "/placeholder", "/opt/env", "nothing to do")]
    fn textual_replacement(
        #[case] input: &str,
        #[case] placeholder: &str,
        #[case] target_prefix: &str,
        #[case] expected: &str,
    ) {
        let mut output = Cursor::new(Vec::new());
        copy_and_replace_textual_placeholder(
            input.as_bytes(),
            &mut output,
            placeholder,
            target_prefix,
        )
        .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.into_inner()), expected);
    }

    #[rstest]
    #[case(
        b"12345Hello, fabulous world!\x006789",
        "fabulous",
        "cruel",
        b"12345Hello, cruel world!\x00\x00\x00\x006789"
    )]
    #[case(b"/long-placeholder/lib\x00tail", "/long-placeholder", "/short", b"/short/lib\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00tail")]
    fn binary_replacement_preserves_size(
        #[case] input: &[u8],
        #[case] placeholder: &str,
        #[case] target_prefix: &str,
        #[case] expected: &[u8],
    ) {
        assert_eq!(input.len(), expected.len());
        let mut output = Cursor::new(Vec::new());
        copy_and_replace_cstring_placeholder(input, &mut output, placeholder, target_prefix)
            .unwrap();
        assert_eq!(output.into_inner(), expected);
    }

    #[test]
    fn binary_replacement_rejects_overlong_prefix() {
        let mut output = Cursor::new(Vec::new());
        let result = copy_and_replace_cstring_placeholder(
            b"/short\x00",
            &mut output,
            "/short",
            "/significantly/longer/prefix",
        );
        assert_matches!(result, Err(LinkFileError::PaddingError { .. }));
    }

    #[test]
    fn binary_replacement_checks_length_before_any_match() {
        // Even a file that does not contain the placeholder is rejected: the
        // length check runs up front so verification can catch it.
        let mut output = Cursor::new(Vec::new());
        let result = copy_and_replace_cstring_placeholder(
            b"no placeholder here",
            &mut output,
            "/p",
            "/much/longer",
        );
        assert_matches!(result, Err(LinkFileError::PaddingError { .. }));
    }
}
