//! Removing files from a prefix.
//!
//! Files are not deleted outright: they are renamed into the prefix's
//! `.trash` directory first. That makes removal work on filesystems that
//! refuse to delete open files (Windows with running executables, virus
//! scanners), and it is what makes transaction rollback exact — a reversed
//! unlink restores the very same bytes from the trash.

use std::collections::HashSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// An error that can occur while unlinking files.
#[derive(Debug, thiserror::Error)]
pub enum UnlinkError {
    /// A directory could not be deleted.
    #[error("failed to delete directory '{0}'")]
    FailedToDeleteDirectory(PathBuf, #[source] std::io::Error),

    /// A file could not be deleted.
    #[error("failed to delete file '{0}'")]
    FailedToDeleteFile(PathBuf, #[source] std::io::Error),

    /// A directory could not be read.
    #[error("failed to read directory '{0}'")]
    FailedToReadDirectory(PathBuf, #[source] std::io::Error),

    /// A directory could not be created.
    #[error("failed to create directory '{0}'")]
    FailedToCreateDirectory(PathBuf, #[source] std::io::Error),

    /// A file could not be moved to the trash.
    #[error("failed to move '{0}' to the trash")]
    FailedToMoveFile(PathBuf, #[source] std::io::Error),
}

/// Moves a file into the `.trash` directory of the prefix and returns the
/// trash location, so the move can be undone.
pub fn move_to_trash(target_prefix: &Path, path: &Path) -> Result<PathBuf, UnlinkError> {
    let trash_dir = target_prefix.join(".trash");
    if !trash_dir.is_dir() {
        fs_err::create_dir_all(&trash_dir)
            .map_err(|e| UnlinkError::FailedToCreateDirectory(trash_dir.clone(), e))?;
    }

    let mut file_name = OsString::new();
    if let Some(name) = path.file_name() {
        file_name.push(name);
        file_name.push(".");
    }
    file_name.push(format!("{}.trash", uuid::Uuid::new_v4().simple()));

    let trash_path = trash_dir.join(file_name);
    fs_err::rename(path, &trash_path)
        .map_err(|e| UnlinkError::FailedToMoveFile(path.to_path_buf(), e))?;
    Ok(trash_path)
}

/// Moves a trashed file back to its original location; the reverse of
/// [`move_to_trash`].
pub fn restore_from_trash(trash_path: &Path, original: &Path) -> Result<(), UnlinkError> {
    if let Some(parent) = original.parent() {
        if !parent.is_dir() {
            fs_err::create_dir_all(parent)
                .map_err(|e| UnlinkError::FailedToCreateDirectory(parent.to_path_buf(), e))?;
        }
    }
    fs_err::rename(trash_path, original)
        .map_err(|e| UnlinkError::FailedToMoveFile(trash_path.to_path_buf(), e))
}

/// Deletes everything in the `.trash` directory of the prefix that can be
/// deleted; files that are still held open stay behind for the next run.
pub fn empty_trash(target_prefix: &Path) -> Result<(), UnlinkError> {
    let trash_dir = target_prefix.join(".trash");
    let read_dir = match fs_err::read_dir(&trash_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(UnlinkError::FailedToReadDirectory(trash_dir, e)),
    };

    let mut files_left = false;
    for entry in read_dir {
        let entry = entry.map_err(|e| UnlinkError::FailedToReadDirectory(trash_dir.clone(), e))?;
        match fs_err::remove_file(entry.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                files_left = true;
            }
            Err(e) => return Err(UnlinkError::FailedToDeleteFile(entry.path(), e)),
        }
    }

    if !files_left {
        fs_err::remove_dir(&trash_dir)
            .map_err(|e| UnlinkError::FailedToDeleteDirectory(trash_dir.clone(), e))?;
    }
    Ok(())
}

/// Removes a directory and then its parents as long as they are empty,
/// stopping at the prefix itself and at directories listed in
/// `keep_directories`.
///
/// For noarch python packages a directory holding only a `__pycache__`
/// leftover counts as empty.
pub fn recursively_remove_empty_directories(
    directory_path: &Path,
    target_prefix: &Path,
    is_python_noarch: bool,
    keep_directories: &HashSet<PathBuf>,
) -> Result<PathBuf, UnlinkError> {
    if directory_path == target_prefix
        || keep_directories.contains(directory_path)
        || !directory_path.exists()
    {
        return Ok(directory_path.to_path_buf());
    }

    assert!(directory_path.starts_with(target_prefix));

    let mut read_dir = directory_path
        .read_dir()
        .map_err(|e| UnlinkError::FailedToReadDirectory(directory_path.to_path_buf(), e))?;

    match read_dir.next().transpose() {
        Ok(None) => {
            std::fs::remove_dir(directory_path).map_err(|e| {
                UnlinkError::FailedToDeleteDirectory(directory_path.to_path_buf(), e)
            })?;

            match directory_path.parent() {
                Some(parent) => recursively_remove_empty_directories(
                    parent,
                    target_prefix,
                    is_python_noarch,
                    keep_directories,
                ),
                None => Ok(directory_path.to_path_buf()),
            }
        }

        // The only entry is a stale `__pycache__` of a noarch package.
        Ok(Some(entry))
            if is_python_noarch
                && entry.file_name() == "__pycache__"
                && read_dir.next().is_none() =>
        {
            std::fs::remove_dir_all(directory_path).map_err(|e| {
                UnlinkError::FailedToDeleteDirectory(directory_path.to_path_buf(), e)
            })?;

            match directory_path.parent() {
                Some(parent) => recursively_remove_empty_directories(
                    parent,
                    target_prefix,
                    is_python_noarch,
                    keep_directories,
                ),
                None => Ok(directory_path.to_path_buf()),
            }
        }

        _ => Ok(directory_path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        empty_trash, move_to_trash, recursively_remove_empty_directories, restore_from_trash,
    };
    use std::collections::HashSet;

    #[test]
    fn trash_roundtrip() {
        let prefix = tempfile::tempdir().unwrap();
        let file = prefix.path().join("bin/tool");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"contents").unwrap();

        let trashed = move_to_trash(prefix.path(), &file).unwrap();
        assert!(!file.exists());
        assert!(trashed.exists());

        restore_from_trash(&trashed, &file).unwrap();
        assert!(file.exists());
        assert_eq!(std::fs::read(&file).unwrap(), b"contents");
    }

    #[test]
    fn empty_trash_removes_directory() {
        let prefix = tempfile::tempdir().unwrap();
        let file = prefix.path().join("tool");
        std::fs::write(&file, b"x").unwrap();
        move_to_trash(prefix.path(), &file).unwrap();
        assert!(prefix.path().join(".trash").exists());

        empty_trash(prefix.path()).unwrap();
        assert!(!prefix.path().join(".trash").exists());

        // Emptying a prefix without trash is fine.
        empty_trash(prefix.path()).unwrap();
    }

    #[test]
    fn removes_empty_parent_chain() {
        let prefix = tempfile::tempdir().unwrap();
        let deep = prefix.path().join("lib/python3.9/site-packages/pkg");
        std::fs::create_dir_all(&deep).unwrap();

        recursively_remove_empty_directories(&deep, prefix.path(), false, &HashSet::new())
            .unwrap();
        assert!(!prefix.path().join("lib").exists());
        assert!(prefix.path().exists());
    }

    #[test]
    fn keeps_non_empty_directories() {
        let prefix = tempfile::tempdir().unwrap();
        let dir = prefix.path().join("share/pkg");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(prefix.path().join("share/other-file"), b"keep me").unwrap();

        recursively_remove_empty_directories(&dir, prefix.path(), false, &HashSet::new()).unwrap();
        assert!(!dir.exists());
        assert!(prefix.path().join("share").exists());
    }

    #[test]
    fn pycache_counts_as_empty_for_noarch() {
        let prefix = tempfile::tempdir().unwrap();
        let pkg = prefix.path().join("site-packages/pkg");
        std::fs::create_dir_all(pkg.join("__pycache__")).unwrap();
        std::fs::write(pkg.join("__pycache__/mod.pyc"), b"bytecode").unwrap();

        recursively_remove_empty_directories(&pkg, prefix.path(), true, &HashSet::new()).unwrap();
        assert!(!pkg.exists());
    }
}
