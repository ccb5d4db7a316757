//! Information about the python interpreter of an environment, needed to
//! link `noarch: python` packages.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use krait_conda_types::{PackageRecord, Platform, Version};

/// The interpreter-specific paths of a python installation within a prefix.
#[derive(Debug, Clone)]
pub struct PythonInfo {
    /// The platform the interpreter is installed for.
    pub platform: Platform,

    /// The major and minor version of the interpreter.
    pub short_version: (u64, u64),

    /// The relative path of the interpreter executable.
    pub path: PathBuf,

    /// The relative path of the site-packages directory.
    pub site_packages_path: PathBuf,

    /// The relative path of the scripts/bin directory.
    pub bin_dir: PathBuf,
}

/// An error constructing a [`PythonInfo`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PythonInfoError {
    /// The interpreter version has no major/minor part.
    #[error("invalid python version '{0}'")]
    InvalidVersion(String),
}

impl PythonInfo {
    /// Builds an instance from the record of the interpreter package.
    pub fn from_python_record(
        record: &PackageRecord,
        platform: Platform,
    ) -> Result<Self, PythonInfoError> {
        Self::from_version(&record.version, platform)
    }

    /// Builds an instance from an interpreter version and platform.
    pub fn from_version(version: &Version, platform: Platform) -> Result<Self, PythonInfoError> {
        let (major, minor) = version
            .as_major_minor()
            .ok_or_else(|| PythonInfoError::InvalidVersion(version.to_string()))?;

        let path = if platform.is_windows() {
            PathBuf::from("python.exe")
        } else {
            PathBuf::from(format!("bin/python{major}.{minor}"))
        };

        let site_packages_path = if platform.is_windows() {
            PathBuf::from("Lib/site-packages")
        } else {
            PathBuf::from(format!("lib/python{major}.{minor}/site-packages"))
        };

        let bin_dir = if platform.is_windows() {
            PathBuf::from("Scripts")
        } else {
            PathBuf::from("bin")
        };

        Ok(Self {
            platform,
            short_version: (major, minor),
            path,
            site_packages_path,
            bin_dir,
        })
    }

    /// The relative path of the interpreter executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A shebang line that runs a script with this interpreter in the given
    /// prefix. Long paths and paths with spaces fall back to the `exec`
    /// trampoline because kernels truncate shebang lines at 127 bytes.
    pub fn shebang(&self, target_prefix: &str) -> String {
        let target_path = Path::new(target_prefix).join(&self.path);
        let target_path = target_path.to_string_lossy().replace('\\', "/");

        if target_path.len() > 127 - 2 || target_path.contains(' ') {
            format!("#!/bin/sh\n'''exec' \"{}\" \"$0\" \"$@\" #'''", &target_path)
        } else {
            format!("#!{}", &target_path)
        }
    }

    /// Maps a path inside a noarch python package to its location in the
    /// prefix: `site-packages/` moves into the interpreter's site-packages,
    /// `python-scripts/` into the bin directory.
    pub fn get_python_noarch_target_path<'a>(&self, relative_path: &'a Path) -> Cow<'a, Path> {
        if let Ok(rest) = relative_path.strip_prefix("site-packages/") {
            self.site_packages_path.join(rest).into()
        } else if let Ok(rest) = relative_path.strip_prefix("python-scripts/") {
            self.bin_dir.join(rest).into()
        } else {
            relative_path.into()
        }
    }

    /// Returns true when switching from `previous` to this interpreter
    /// requires relinking all noarch python packages (the site-packages
    /// path changes with the minor version).
    pub fn is_relink_required(&self, previous: &PythonInfo) -> bool {
        self.short_version.0 != previous.short_version.0
            || self.short_version.1 != previous.short_version.1
    }
}

#[cfg(test)]
mod test {
    use super::PythonInfo;
    use krait_conda_types::{Platform, Version};
    use std::path::Path;
    use std::str::FromStr;

    #[test]
    fn unix_paths() {
        let info =
            PythonInfo::from_version(&Version::from_str("3.11.2").unwrap(), Platform::Linux64)
                .unwrap();
        assert_eq!(info.short_version, (3, 11));
        assert_eq!(info.path(), Path::new("bin/python3.11"));
        assert_eq!(
            info.site_packages_path,
            Path::new("lib/python3.11/site-packages")
        );
    }

    #[test]
    fn windows_paths() {
        let info = PythonInfo::from_version(&Version::from_str("3.11.2").unwrap(), Platform::Win64)
            .unwrap();
        assert_eq!(info.path(), Path::new("python.exe"));
        assert_eq!(info.site_packages_path, Path::new("Lib/site-packages"));
        assert_eq!(info.bin_dir, Path::new("Scripts"));
    }

    #[test]
    fn noarch_remapping() {
        let info =
            PythonInfo::from_version(&Version::from_str("3.11.0").unwrap(), Platform::Linux64)
                .unwrap();
        assert_eq!(
            info.get_python_noarch_target_path(Path::new("site-packages/requests/__init__.py"))
                .as_ref(),
            Path::new("lib/python3.11/site-packages/requests/__init__.py")
        );
        assert_eq!(
            info.get_python_noarch_target_path(Path::new("python-scripts/my-tool"))
                .as_ref(),
            Path::new("bin/my-tool")
        );
        assert_eq!(
            info.get_python_noarch_target_path(Path::new("share/doc/readme"))
                .as_ref(),
            Path::new("share/doc/readme")
        );
    }

    #[test]
    fn relink_detection() {
        let py310 =
            PythonInfo::from_version(&Version::from_str("3.10.1").unwrap(), Platform::Linux64)
                .unwrap();
        let py311 =
            PythonInfo::from_version(&Version::from_str("3.11.0").unwrap(), Platform::Linux64)
                .unwrap();
        let py311_patch =
            PythonInfo::from_version(&Version::from_str("3.11.9").unwrap(), Platform::Linux64)
                .unwrap();
        assert!(py311.is_relink_required(&py310));
        assert!(!py311_patch.is_relink_required(&py311));
    }

    #[test]
    fn shebang() {
        let info =
            PythonInfo::from_version(&Version::from_str("3.11.0").unwrap(), Platform::Linux64)
                .unwrap();
        assert_eq!(info.shebang("/opt/env"), "#!/opt/env/bin/python3.11");

        let long_prefix = format!("/{}", "a".repeat(150));
        assert!(info.shebang(&long_prefix).starts_with("#!/bin/sh"));
    }

    #[test]
    fn invalid_version() {
        assert!(PythonInfo::from_version(
            &Version::from_str("3").unwrap(),
            Platform::Linux64
        )
        .is_err());
    }
}
