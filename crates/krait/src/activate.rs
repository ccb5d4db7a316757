//! Computing what activating a prefix means, in shell-neutral terms.
//!
//! The core does not render shell syntax; it reports which paths to prepend,
//! which variables to set or unset, and which package-provided scripts to
//! source. A shell-specific collaborator turns that into `export`s or
//! `set`s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use krait_conda_types::Platform;

/// The state changes activating a prefix requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationResult {
    /// Directories to prepend to `PATH`, in order.
    pub prepend_path: Vec<PathBuf>,

    /// Environment variables to set.
    pub set_vars: BTreeMap<String, String>,

    /// Environment variables to unset.
    pub unset_vars: Vec<String>,

    /// Package provided activation scripts to source, in order.
    pub source_scripts: Vec<PathBuf>,
}

/// Computes the activation of a prefix.
pub fn activate(prefix: &Path, platform: Platform, current_shlvl: i64) -> ActivationResult {
    let prepend_path = if platform.is_windows() {
        vec![
            prefix.to_path_buf(),
            prefix.join("Library").join("mingw-w64").join("bin"),
            prefix.join("Library").join("usr").join("bin"),
            prefix.join("Library").join("bin"),
            prefix.join("Scripts"),
            prefix.join("bin"),
        ]
    } else {
        vec![prefix.join("bin")]
    };

    let mut set_vars = BTreeMap::new();
    set_vars.insert(
        "CONDA_PREFIX".to_owned(),
        prefix.to_string_lossy().into_owned(),
    );
    set_vars.insert(
        "CONDA_DEFAULT_ENV".to_owned(),
        default_env_name(prefix).into_owned(),
    );
    set_vars.insert("CONDA_SHLVL".to_owned(), (current_shlvl + 1).to_string());

    ActivationResult {
        prepend_path,
        set_vars,
        unset_vars: Vec::new(),
        source_scripts: collect_activation_scripts(prefix, platform),
    }
}

/// The name a prefix is referred to by: its directory name, unless the
/// prefix is a root-style installation.
fn default_env_name(prefix: &Path) -> std::borrow::Cow<'_, str> {
    prefix
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_else(|| prefix.to_string_lossy())
}

/// Scripts under `etc/conda/activate.d` are sourced in lexicographic order.
fn collect_activation_scripts(prefix: &Path, platform: Platform) -> Vec<PathBuf> {
    let script_dir = prefix.join("etc").join("conda").join("activate.d");
    let extension = if platform.is_windows() { "bat" } else { "sh" };

    let Ok(entries) = std::fs::read_dir(&script_dir) else {
        return Vec::new();
    };

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext == extension)
                .unwrap_or(false)
        })
        .collect();
    scripts.sort();
    scripts
}

#[cfg(test)]
mod test {
    use super::activate;
    use krait_conda_types::Platform;
    use std::path::Path;

    #[test]
    fn unix_activation() {
        let result = activate(Path::new("/envs/test"), Platform::Linux64, 0);
        assert_eq!(result.prepend_path, vec![Path::new("/envs/test/bin")]);
        assert_eq!(
            result.set_vars.get("CONDA_PREFIX").map(String::as_str),
            Some("/envs/test")
        );
        assert_eq!(
            result.set_vars.get("CONDA_DEFAULT_ENV").map(String::as_str),
            Some("test")
        );
        assert_eq!(
            result.set_vars.get("CONDA_SHLVL").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn windows_activation_has_library_paths() {
        let result = activate(Path::new("/envs/test"), Platform::Win64, 1);
        assert!(result.prepend_path.len() > 1);
        assert_eq!(
            result.set_vars.get("CONDA_SHLVL").map(String::as_str),
            Some("2")
        );
    }

    #[test]
    fn activation_scripts_are_sorted() {
        let prefix = tempfile::tempdir().unwrap();
        let script_dir = prefix.path().join("etc/conda/activate.d");
        std::fs::create_dir_all(&script_dir).unwrap();
        std::fs::write(script_dir.join("20-b.sh"), "").unwrap();
        std::fs::write(script_dir.join("10-a.sh"), "").unwrap();
        std::fs::write(script_dir.join("ignored.txt"), "").unwrap();

        let result = activate(prefix.path(), Platform::Linux64, 0);
        assert_eq!(
            result.source_scripts,
            vec![script_dir.join("10-a.sh"), script_dir.join("20-b.sh")]
        );
    }
}
