//! The configuration of the core, read once from the environment.
//!
//! There is deliberately no global context object: the configuration is a
//! plain struct with every option enumerated, parsed once at startup and
//! passed by reference to whoever needs it.

use std::path::PathBuf;

use krait_solve::ChannelPriority;

/// How thoroughly extracted files are checked against `paths.json` during
/// transaction verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SafetyChecks {
    /// Mismatches fail the transaction.
    Enabled,
    /// Mismatches are logged but do not fail the transaction.
    #[default]
    Warn,
    /// No file content checks.
    Disabled,
}

/// What happens when a file to be linked already exists in the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathConflict {
    /// Conflicts fail transaction verification.
    #[default]
    Prevent,
    /// Conflicts are logged as warnings.
    Warn,
    /// Conflicting files are silently overwritten.
    Clobber,
}

/// The flattened configuration namespace of the core. Every field maps to
/// one `CONDA_*` environment variable.
#[derive(Debug, Clone)]
pub struct Config {
    /// The installation's own prefix (`CONDA_ROOT_PREFIX`).
    pub root_prefix: Option<PathBuf>,

    /// The package cache directories (`CONDA_PKGS_DIRS`, comma separated).
    pub pkgs_dirs: Vec<PathBuf>,

    /// The directories environments are created in (`CONDA_ENVS_PATH`).
    pub envs_dirs: Vec<PathBuf>,

    /// The name of the active environment (`CONDA_DEFAULT_ENV`).
    pub default_env: Option<String>,

    /// The currently activated prefix (`CONDA_PREFIX`).
    pub prefix: Option<PathBuf>,

    /// The activation nesting level (`CONDA_SHLVL`).
    pub shlvl: Option<i64>,

    /// How channel order influences solves (`CONDA_CHANNEL_PRIORITY`:
    /// `strict`, `true` or `false`).
    pub channel_priority: ChannelPriority,

    /// Whether confirmation prompts auto-accept (`CONDA_ALWAYS_YES`).
    pub always_yes: bool,

    /// Whether network access is forbidden (`CONDA_OFFLINE`).
    pub offline: bool,

    /// Whether transactions stop before touching the prefix
    /// (`CONDA_DRY_RUN`).
    pub dry_run: bool,

    /// File content verification policy (`CONDA_SAFETY_CHECKS`).
    pub safety_checks: SafetyChecks,

    /// Whether a failed transaction is rolled back
    /// (`CONDA_ROLLBACK_ENABLED`, default on).
    pub rollback_enabled: bool,

    /// Whether soft links may be used at all (`CONDA_ALLOW_SOFTLINKS`).
    pub allow_softlinks: bool,

    /// Always copy files instead of linking (`CONDA_ALWAYS_COPY`).
    pub always_copy: bool,

    /// Always soft-link files (`CONDA_ALWAYS_SOFTLINK`).
    pub always_softlink: bool,

    /// Package names that may never be installed
    /// (`CONDA_DISALLOWED_PACKAGES`, `&` separated).
    pub disallowed_packages: Vec<String>,

    /// Path conflict policy (`CONDA_PATH_CONFLICT`: `prevent`, `warn` or
    /// `clobber`).
    pub path_conflict: PathConflict,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_prefix: None,
            pkgs_dirs: Vec::new(),
            envs_dirs: Vec::new(),
            default_env: None,
            prefix: None,
            shlvl: None,
            channel_priority: ChannelPriority::default(),
            always_yes: false,
            offline: false,
            dry_run: false,
            safety_checks: SafetyChecks::default(),
            // A failed transaction rolls the prefix back unless explicitly
            // disabled.
            rollback_enabled: true,
            allow_softlinks: false,
            always_copy: false,
            always_softlink: false,
            disallowed_packages: Vec::new(),
            path_conflict: PathConflict::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from the environment.
    pub fn from_env() -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            root_prefix: env("CONDA_ROOT_PREFIX").map(PathBuf::from),
            pkgs_dirs: env("CONDA_PKGS_DIRS")
                .map(|dirs| {
                    dirs.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
            envs_dirs: env("CONDA_ENVS_PATH")
                .map(|dirs| std::env::split_paths(&dirs).collect())
                .unwrap_or_default(),
            default_env: env("CONDA_DEFAULT_ENV"),
            prefix: env("CONDA_PREFIX").map(PathBuf::from),
            shlvl: env("CONDA_SHLVL").and_then(|v| v.parse().ok()),
            channel_priority: match env("CONDA_CHANNEL_PRIORITY").as_deref() {
                Some("strict") => ChannelPriority::Strict,
                Some(value) if is_falsy(value) => ChannelPriority::Disabled,
                _ => ChannelPriority::Flexible,
            },
            always_yes: env("CONDA_ALWAYS_YES").as_deref().is_some_and(is_truthy),
            offline: env("CONDA_OFFLINE").as_deref().is_some_and(is_truthy),
            dry_run: env("CONDA_DRY_RUN").as_deref().is_some_and(is_truthy),
            safety_checks: match env("CONDA_SAFETY_CHECKS").as_deref() {
                Some("enabled") => SafetyChecks::Enabled,
                Some("disabled") => SafetyChecks::Disabled,
                _ => SafetyChecks::Warn,
            },
            rollback_enabled: env("CONDA_ROLLBACK_ENABLED")
                .as_deref()
                .map_or(true, is_truthy),
            allow_softlinks: env("CONDA_ALLOW_SOFTLINKS")
                .as_deref()
                .is_some_and(is_truthy),
            always_copy: env("CONDA_ALWAYS_COPY").as_deref().is_some_and(is_truthy),
            always_softlink: env("CONDA_ALWAYS_SOFTLINK")
                .as_deref()
                .is_some_and(is_truthy),
            disallowed_packages: env("CONDA_DISALLOWED_PACKAGES")
                .map(|list| {
                    list.split('&')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(ToOwned::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            path_conflict: match env("CONDA_PATH_CONFLICT").as_deref() {
                Some("clobber") => PathConflict::Clobber,
                Some("warn") => PathConflict::Warn,
                _ => PathConflict::Prevent,
            },
        }
    }

    /// Returns the configured package cache directories, falling back to
    /// `<root_prefix>/pkgs` and then `~/.conda/pkgs`.
    pub fn pkgs_dirs(&self) -> Vec<PathBuf> {
        if !self.pkgs_dirs.is_empty() {
            return self.pkgs_dirs.clone();
        }
        if let Some(root) = &self.root_prefix {
            return vec![root.join("pkgs")];
        }
        dirs::home_dir()
            .map(|home| vec![home.join(".conda").join("pkgs")])
            .unwrap_or_default()
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn is_falsy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
