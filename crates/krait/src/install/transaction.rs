//! The unlink/link transaction: the only thing that mutates a prefix.
//!
//! A [`Transaction`] is the diff between the current and the desired state
//! of a prefix. [`UnlinkLinkTransaction`] turns that diff into groups of
//! [`PathAction`]s and runs them in three phases:
//!
//! 1. **prepare** — read the metadata of every package, decide link types,
//!    and enumerate every action.
//! 2. **verify** — run every action's pure checks plus the transaction-wide
//!    ones: clobber detection, self-protection, and the safety checks of
//!    file sizes and hashes.
//! 3. **execute** — under the prefix's advisory lock and with termination
//!    signals deferred, run the groups sequentially. Any failure reverses
//!    the failing group from the failed action backwards and then every
//!    completed group, unless rollback is disabled.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use krait_conda_types::history::Revision;
use krait_conda_types::package::{
    IndexJson, LinkJson, NoArchLinks, PackageFile, PathType, PathsJson,
};
use krait_conda_types::{MatchSpec, PackageRecord, Platform, PrefixRecord, RepoDataRecord};

use super::actions::{
    ActionContext, ActionError, AppendHistoryAction, CompilePycAction, CreateDirectoryAction,
    CreatePrefixRecordAction, CreatePythonEntryPointAction, LinkPathAction, MakeMenuAction,
    PathAction, RemoveDirectoryAction, RemovePrefixRecordAction, RunLinkScriptAction,
    UnlinkPathAction,
};
use super::link::{can_create_hardlinks, can_create_symlinks};
use super::link_script::{LinkScriptType, MenuInstaller, SubprocessRunner};
use super::python::{PythonInfo, PythonInfoError};
use super::signal::SignalGuard;
use super::unlink::empty_trash;
use crate::config::{Config, PathConflict, SafetyChecks};
use crate::prefix_data::PrefixData;

/// A single operation of a transaction.
#[derive(Debug, Clone)]
pub enum TransactionOperation {
    /// Install a package that is not currently present.
    Install(RepoDataRecord),

    /// Replace an installed package with another build.
    Change {
        /// The installed record to remove.
        old: PrefixRecord,
        /// The record to install in its place.
        new: RepoDataRecord,
    },

    /// Remove and relink the same record; required for noarch python
    /// packages when the interpreter version changes.
    Reinstall(PrefixRecord),

    /// Remove an installed package.
    Remove(PrefixRecord),
}

impl TransactionOperation {
    /// The record that ends up installed by this operation, if any.
    pub fn record_to_install(&self) -> Option<&RepoDataRecord> {
        match self {
            TransactionOperation::Install(record) => Some(record),
            TransactionOperation::Change { new, .. } => Some(new),
            TransactionOperation::Reinstall(record) => Some(&record.repodata_record),
            TransactionOperation::Remove(_) => None,
        }
    }

    /// The installed record removed by this operation, if any.
    pub fn record_to_remove(&self) -> Option<&PrefixRecord> {
        match self {
            TransactionOperation::Install(_) => None,
            TransactionOperation::Change { old, .. } => Some(old),
            TransactionOperation::Reinstall(record) => Some(record),
            TransactionOperation::Remove(record) => Some(record),
        }
    }
}

/// The diff between the current contents of a prefix and a desired record
/// set.
#[derive(Debug)]
pub struct Transaction {
    /// The operations to perform, in no particular order yet.
    pub operations: Vec<TransactionOperation>,

    /// The python interpreter of the desired state, if any.
    pub python_info: Option<PythonInfo>,

    /// The python interpreter currently installed, if any.
    pub current_python_info: Option<PythonInfo>,

    /// The platform of the prefix.
    pub platform: Platform,
}

impl Transaction {
    /// Computes the operations needed to bring `current` to `desired`.
    ///
    /// Noarch python packages whose files stay identical are still
    /// reinstalled when the python minor version changes, because their
    /// site-packages location moves.
    pub fn from_current_and_desired(
        current: Vec<PrefixRecord>,
        desired: Vec<RepoDataRecord>,
        platform: Platform,
    ) -> Result<Self, PythonInfoError> {
        let current_python_info = find_python_info(
            current.iter().map(|r| &r.repodata_record.package_record),
            platform,
        )?;
        let python_info = find_python_info(desired.iter().map(|r| &r.package_record), platform)?;

        let needs_python_relink = match (&current_python_info, &python_info) {
            (Some(current), Some(desired)) => desired.is_relink_required(current),
            _ => false,
        };

        let mut desired_by_name: HashMap<String, RepoDataRecord> = desired
            .into_iter()
            .map(|record| {
                (
                    record.package_record.name.as_normalized().to_owned(),
                    record,
                )
            })
            .collect();

        let mut operations = Vec::new();
        for record in current {
            let name = record
                .repodata_record
                .package_record
                .name
                .as_normalized()
                .to_owned();
            match desired_by_name.remove(&name) {
                None => operations.push(TransactionOperation::Remove(record)),
                Some(desired) => {
                    let old = &record.repodata_record.package_record;
                    let new = &desired.package_record;
                    let identical = old.version == new.version
                        && old.build == new.build
                        && old.subdir == new.subdir;
                    if !identical {
                        operations.push(TransactionOperation::Change {
                            old: record,
                            new: desired,
                        });
                    } else if new.noarch.is_python() && needs_python_relink {
                        operations.push(TransactionOperation::Reinstall(record));
                    }
                }
            }
        }
        for record in desired_by_name.into_values() {
            operations.push(TransactionOperation::Install(record));
        }

        Ok(Self {
            operations,
            python_info,
            current_python_info,
            platform,
        })
    }

    /// The records this transaction installs.
    pub fn records_to_install(&self) -> impl Iterator<Item = &RepoDataRecord> {
        self.operations
            .iter()
            .filter_map(TransactionOperation::record_to_install)
    }

    /// The installed records this transaction removes.
    pub fn records_to_remove(&self) -> impl Iterator<Item = &PrefixRecord> {
        self.operations
            .iter()
            .filter_map(TransactionOperation::record_to_remove)
    }

    /// Returns true when there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn find_python_info<'a>(
    records: impl Iterator<Item = &'a PackageRecord>,
    platform: Platform,
) -> Result<Option<PythonInfo>, PythonInfoError> {
    records
        .into_iter()
        .find(|r| r.name.as_normalized() == "python")
        .map(|record| PythonInfo::from_python_record(record, platform))
        .transpose()
}

/// What a group of actions belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Unlink,
    Link,
    Finalize,
}

/// The actions of one package (or of the finalization step).
#[derive(Debug)]
struct ActionGroup {
    /// The dist string of the package, for error reporting.
    package: Option<String>,
    kind: GroupKind,
    actions: Vec<PathAction>,
    /// Prefix record entries produced by the executed file actions of this
    /// group.
    collected: Vec<krait_conda_types::prefix_record::PathsEntry>,
    /// How many actions of this group have been executed.
    executed: usize,
}

/// An issue found during the verify phase. All issues of a transaction are
/// reported together.
#[derive(Debug, thiserror::Error)]
pub enum VerificationIssue {
    /// A single action failed its checks.
    #[error("{package}: {source}")]
    ActionFailed {
        /// The package the action belongs to.
        package: String,
        /// The underlying failure.
        #[source]
        source: ActionError,
    },

    /// A path to be linked already exists and belongs to an installed
    /// package that is not part of this transaction.
    #[error("the path '{path}' is claimed by installed package '{owner}'")]
    KnownClobber {
        /// The conflicting path.
        path: PathBuf,
        /// The dist string of the owning package.
        owner: String,
    },

    /// A path to be linked already exists but no installed package claims
    /// it.
    #[error("the path '{path}' already exists in the prefix but belongs to no package")]
    UnknownClobber {
        /// The conflicting path.
        path: PathBuf,
    },

    /// Two packages of this transaction want to write the same path.
    #[error("the path '{path}' is written by multiple packages: {packages:?}")]
    SharedLinkPath {
        /// The conflicting path.
        path: PathBuf,
        /// The dist strings of the packages that collide.
        packages: Vec<String>,
    },

    /// The transaction would remove the package manager itself from its own
    /// environment.
    #[error("'{name}' cannot be removed from the base environment because it is required by the package manager")]
    RemoveError {
        /// The protected package name.
        name: String,
    },

    /// An extracted file does not match the size or hash its package
    /// recorded for it.
    #[error("{package}: the file '{path}' failed its safety check: {reason}")]
    SafetyError {
        /// The package the file belongs to.
        package: String,
        /// The offending path.
        path: PathBuf,
        /// Why the check failed.
        reason: String,
    },
}

/// An error from preparing, verifying or executing a transaction.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// The python version of the environment could not be determined.
    #[error(transparent)]
    PythonInfoError(#[from] PythonInfoError),

    /// The metadata of an extracted package could not be read.
    #[error("failed to read metadata of package '{0}'")]
    FailedToReadPackageMetadata(String, #[source] std::io::Error),

    /// The extracted directory of a package to link is missing from the
    /// cache.
    #[error("the package '{0}' is not extracted in any package cache")]
    MissingCacheEntry(String),

    /// The target prefix is not valid UTF-8.
    #[error("the target prefix is not valid UTF-8")]
    PrefixNotUtf8,

    /// Another transaction holds the prefix lock.
    #[error("could not acquire the lock on prefix '{0}': {1}")]
    LockError(PathBuf, String),

    /// One or more verification issues; nothing was executed.
    #[error("transaction verification failed:\n{}", .0.iter().map(ToString::to_string).join("\n"))]
    VerificationFailed(Vec<VerificationIssue>),

    /// An action failed during execution. When rollback ran, its own
    /// failures are accumulated next to the triggering error.
    #[error("transaction failed on {}: {source}", package.as_deref().unwrap_or("finalization"))]
    ExecutionFailed {
        /// The package whose action failed.
        package: Option<String>,
        /// The failing action's error.
        #[source]
        source: ActionError,
        /// Errors raised while rolling back; best effort, may be empty.
        rollback_errors: Vec<ActionError>,
        /// Whether rollback ran at all.
        rolled_back: bool,
    },

    /// The transaction was interrupted by a signal; the prefix was rolled
    /// back.
    #[error("the transaction was cancelled")]
    Cancelled {
        /// Errors raised while rolling back.
        rollback_errors: Vec<ActionError>,
    },

    /// An IO error outside any action.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// The prepared form of a transaction: per-package groups of actions plus
/// everything needed to run them.
pub struct UnlinkLinkTransaction {
    target_prefix: PathBuf,
    target_prefix_str: String,
    platform: Platform,
    python_info: Option<PythonInfo>,
    groups: Vec<ActionGroup>,
    /// The relative paths removed by the unlink groups; linking over these
    /// is not a clobber.
    unlinked_paths: FxHashSet<PathBuf>,
    /// The package names unlinked and linked by this transaction.
    unlink_names: FxHashSet<String>,
    link_names: FxHashSet<String>,
    /// (dist, extracted dir, paths.json) of every link group, for the
    /// safety checks.
    link_sources: Vec<(String, PathBuf, PathsJson)>,
}

impl UnlinkLinkTransaction {
    /// Phase 1: turn the diff into concrete actions.
    ///
    /// `extracted_dirs` maps dist strings to the extracted cache entries the
    /// fetch pipeline produced. `requested_specs` attach the matching user
    /// spec to the records it requested; `command` and `command_line` feed
    /// the history entry.
    pub fn prepare(
        transaction: &Transaction,
        extracted_dirs: &HashMap<String, PathBuf>,
        target_prefix: &Path,
        requested_specs: &[MatchSpec],
        command: &str,
        command_line: Option<String>,
    ) -> Result<Self, TransactionError> {
        let target_prefix_str = target_prefix
            .to_str()
            .ok_or(TransactionError::PrefixNotUtf8)?
            .to_owned();

        let mut groups = Vec::new();
        let mut unlinked_paths = FxHashSet::default();
        let mut unlink_names = FxHashSet::default();
        let mut link_names = FxHashSet::default();
        let mut link_sources = Vec::new();

        // Unlink groups come first: within a prefix the old files of a name
        // are gone before the new ones arrive, so observers never see both.
        for record in transaction.records_to_remove() {
            let group = Self::prepare_unlink_group(record);
            for action in &group.actions {
                if let PathAction::UnlinkPath(unlink) = action {
                    unlinked_paths.insert(unlink.relative_path.clone());
                }
            }
            unlink_names.insert(
                record
                    .repodata_record
                    .package_record
                    .name
                    .as_normalized()
                    .to_owned(),
            );
            groups.push(group);
        }

        // Link groups follow the dependency order of the records, so a
        // package's post-link script runs after its dependencies exist.
        let install_records: Vec<&RepoDataRecord> = transaction.records_to_install().collect();
        for record in PackageRecord::sort_topologically(install_records) {
            let dist = record.package_record.dist_str();
            let package_dir = extracted_dirs
                .get(&dist)
                .ok_or_else(|| TransactionError::MissingCacheEntry(dist.clone()))?;
            let group = Self::prepare_link_group(
                record,
                package_dir,
                transaction,
                requested_specs,
                &mut link_sources,
            )?;
            link_names.insert(record.package_record.name.as_normalized().to_owned());
            groups.push(group);
        }

        // The finalization group registers the transaction in the history.
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let revision = Revision {
            timestamp,
            removed: transaction
                .records_to_remove()
                .map(|r| r.repodata_record.package_record.dist_str())
                .collect::<BTreeSet<_>>(),
            added: transaction
                .records_to_install()
                .map(|r| r.package_record.dist_str())
                .collect::<BTreeSet<_>>(),
        };
        groups.push(ActionGroup {
            package: None,
            kind: GroupKind::Finalize,
            actions: vec![PathAction::AppendHistory(AppendHistoryAction::new(
                revision,
                command_line,
                Some((
                    command.to_owned(),
                    requested_specs.iter().map(ToString::to_string).collect(),
                )),
            ))],
            collected: Vec::new(),
            executed: 0,
        });

        Ok(Self {
            target_prefix: target_prefix.to_path_buf(),
            target_prefix_str,
            platform: transaction.platform,
            python_info: transaction.python_info.clone(),
            groups,
            unlinked_paths,
            unlink_names,
            link_names,
            link_sources,
        })
    }

    fn prepare_unlink_group(record: &PrefixRecord) -> ActionGroup {
        let mut actions = Vec::new();

        // The pre-unlink script runs while the files are still in place.
        actions.push(PathAction::RunLinkScript(RunLinkScriptAction::new(
            record.repodata_record.package_record.clone(),
            LinkScriptType::PreUnlink,
            None,
        )));

        let files: Vec<&PathBuf> = if record.paths_data.paths.is_empty() {
            record.files.iter().collect()
        } else {
            record
                .paths_data
                .paths
                .iter()
                .map(|entry| &entry.relative_path)
                .collect()
        };

        let mut parent_dirs: BTreeSet<PathBuf> = BTreeSet::new();
        for file in &files {
            actions.push(PathAction::UnlinkPath(UnlinkPathAction::new(
                (*file).clone(),
            )));
            let mut parent = file.parent();
            while let Some(dir) = parent {
                if dir.as_os_str().is_empty() {
                    break;
                }
                parent_dirs.insert(dir.to_path_buf());
                parent = dir.parent();
            }
        }

        // Directories deepest first, so children empty out before their
        // parents are attempted.
        for dir in parent_dirs
            .into_iter()
            .sorted_by_key(|dir| std::cmp::Reverse(dir.components().count()))
        {
            actions.push(PathAction::RemoveDirectory(RemoveDirectoryAction::new(dir)));
        }

        actions.push(PathAction::RemovePrefixRecord(
            RemovePrefixRecordAction::new(record.file_name()),
        ));

        ActionGroup {
            package: Some(record.repodata_record.package_record.dist_str()),
            kind: GroupKind::Unlink,
            actions,
            collected: Vec::new(),
            executed: 0,
        }
    }

    fn prepare_link_group(
        record: &RepoDataRecord,
        package_dir: &Path,
        transaction: &Transaction,
        requested_specs: &[MatchSpec],
        link_sources: &mut Vec<(String, PathBuf, PathsJson)>,
    ) -> Result<ActionGroup, TransactionError> {
        let dist = record.package_record.dist_str();
        let read_err =
            |e: std::io::Error| TransactionError::FailedToReadPackageMetadata(dist.clone(), e);

        let index_json = IndexJson::from_package_directory(package_dir).map_err(read_err)?;
        let paths_json = PathsJson::from_package_directory_with_deprecated_fallback(package_dir)
            .map_err(read_err)?;
        let link_json = if index_json.noarch.is_python() {
            LinkJson::from_package_directory_with_fallback(package_dir).map_err(read_err)?
        } else {
            None
        };

        let is_noarch_python = index_json.noarch.is_python();
        let python_info = transaction.python_info.as_ref();

        let mut actions = Vec::new();

        // The pre-link script runs from the extracted package, before any of
        // its files exist in the prefix.
        actions.push(PathAction::RunLinkScript(RunLinkScriptAction::new(
            record.package_record.clone(),
            LinkScriptType::PreLink,
            Some(package_dir.to_path_buf()),
        )));

        // Compute the prefix-relative target of every file, remapping
        // noarch python layouts into the interpreter's directories.
        let mut file_targets = Vec::new();
        let mut explicit_dirs: BTreeSet<PathBuf> = BTreeSet::new();
        for entry in &paths_json.paths {
            if entry.path_type == PathType::Directory {
                explicit_dirs.insert(entry.relative_path.clone());
                continue;
            }
            let target: PathBuf = if is_noarch_python {
                match python_info {
                    Some(info) => info
                        .get_python_noarch_target_path(&entry.relative_path)
                        .into_owned(),
                    None => entry.relative_path.clone(),
                }
            } else {
                entry.relative_path.clone()
            };
            file_targets.push((entry.clone(), target));
        }

        // Menu definition files come first on windows so shortcuts can be
        // created as soon as possible.
        if transaction.platform.is_windows() {
            file_targets.sort_by_key(|(_, target)| !is_menu_file(target));
        }

        // Directories: conda-meta, the explicit directory entries, and every
        // parent, shallowest first.
        let mut directories: BTreeSet<PathBuf> = explicit_dirs;
        directories.insert(PathBuf::from("conda-meta"));
        for (_, target) in &file_targets {
            let mut parent = target.parent();
            while let Some(dir) = parent {
                if dir.as_os_str().is_empty() {
                    break;
                }
                directories.insert(dir.to_path_buf());
                parent = dir.parent();
            }
        }
        for dir in directories
            .into_iter()
            .sorted_by_key(|dir| dir.components().count())
        {
            actions.push(PathAction::CreateDirectory(CreateDirectoryAction::new(dir)));
        }

        let mut py_files = Vec::new();
        let mut menu_files = Vec::new();
        for (entry, target) in file_targets {
            if is_noarch_python
                && target.extension().map(|ext| ext == "py").unwrap_or(false)
            {
                py_files.push(target.clone());
            }
            if is_menu_file(&target) {
                menu_files.push(target.clone());
            }
            actions.push(PathAction::LinkPath(LinkPathAction::new(
                package_dir.to_path_buf(),
                entry,
                target,
            )));
        }

        if transaction.platform.is_windows() {
            for menu_file in menu_files {
                actions.push(PathAction::MakeMenu(MakeMenuAction::new(menu_file)));
            }
        }

        // Entry points and byte-compilation for noarch python packages.
        if let Some(link_json) = link_json {
            if let NoArchLinks::Python(entry_points) = link_json.noarch {
                for entry_point in entry_points.entry_points {
                    actions.push(PathAction::CreatePythonEntryPoint(
                        CreatePythonEntryPointAction::new(entry_point),
                    ));
                }
            }
        }
        if is_noarch_python && !py_files.is_empty() {
            actions.push(PathAction::CompilePyc(CompilePycAction::new(py_files)));
        }

        let requested_spec = requested_specs
            .iter()
            .find(|spec| {
                spec.name
                    .as_ref()
                    .is_some_and(|name| name == &record.package_record.name)
            })
            .map(ToString::to_string);
        actions.push(PathAction::CreatePrefixRecord(
            CreatePrefixRecordAction::new(
                record.clone(),
                package_dir.to_path_buf(),
                requested_spec,
            ),
        ));

        // The post-link script sees the fully linked package.
        actions.push(PathAction::RunLinkScript(RunLinkScriptAction::new(
            record.package_record.clone(),
            LinkScriptType::PostLink,
            None,
        )));

        link_sources.push((dist.clone(), package_dir.to_path_buf(), paths_json));

        Ok(ActionGroup {
            package: Some(dist),
            kind: GroupKind::Link,
            actions,
            collected: Vec::new(),
            executed: 0,
        })
    }

    /// Phase 2: verify every action and the transaction-wide invariants.
    /// All failures are collected and reported together.
    pub fn verify(
        &self,
        prefix_data: &PrefixData,
        config: &Config,
        runner: &dyn SubprocessRunner,
        menu_installer: Option<&dyn MenuInstaller>,
    ) -> Result<(), TransactionError> {
        let ctx = self.action_context(config, runner, menu_installer, false, false);
        let mut issues = Vec::new();

        for group in &self.groups {
            for action in &group.actions {
                if let Err(source) = action.verify(&ctx) {
                    issues.push(VerificationIssue::ActionFailed {
                        package: group.package.clone().unwrap_or_default(),
                        source,
                    });
                }
            }
        }

        self.verify_clobbers(prefix_data, config, &ctx, &mut issues);
        self.verify_self_protection(prefix_data, config, &mut issues);
        self.verify_safety_checks(config, &mut issues);

        if issues.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::VerificationFailed(issues))
        }
    }

    /// No two link actions may target the same path, and a to-be-linked path
    /// that is not scheduled for unlink must not already exist in the
    /// prefix.
    fn verify_clobbers(
        &self,
        prefix_data: &PrefixData,
        config: &Config,
        ctx: &ActionContext<'_>,
        issues: &mut Vec<VerificationIssue>,
    ) {
        if config.path_conflict == PathConflict::Clobber {
            return;
        }

        let unlinked_names: FxHashSet<String> = self
            .groups
            .iter()
            .filter(|g| g.kind == GroupKind::Unlink)
            .filter_map(|g| g.package.clone())
            .collect();

        let mut targets: FxHashMap<PathBuf, Vec<String>> = FxHashMap::default();
        for group in self.groups.iter().filter(|g| g.kind == GroupKind::Link) {
            for action in &group.actions {
                for path in action.created_paths(ctx) {
                    targets
                        .entry(path)
                        .or_default()
                        .push(group.package.clone().unwrap_or_default());
                }
            }
        }

        for (path, packages) in targets.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            // Intra-transaction clobber: several link groups write the same
            // path.
            if packages.len() > 1 {
                let issue = VerificationIssue::SharedLinkPath {
                    path: path.clone(),
                    packages: packages.clone(),
                };
                if config.path_conflict == PathConflict::Warn {
                    tracing::warn!("{issue}");
                } else {
                    issues.push(issue);
                }
                continue;
            }

            // A path that the unlink half of the transaction removes is fair
            // game.
            if self.unlinked_paths.contains(path) {
                continue;
            }
            if !self.target_prefix.join(path).exists() {
                continue;
            }

            // The file exists: known clobber if a surviving installed
            // package claims it, unknown otherwise.
            let owner = prefix_data.iter_records().find(|record| {
                record.files.iter().any(|file| file == path)
                    && !unlinked_names
                        .contains(&record.repodata_record.package_record.dist_str())
            });
            let issue = match owner {
                Some(owner) => VerificationIssue::KnownClobber {
                    path: path.clone(),
                    owner: owner.repodata_record.package_record.dist_str(),
                },
                None => VerificationIssue::UnknownClobber { path: path.clone() },
            };
            if config.path_conflict == PathConflict::Warn {
                tracing::warn!("{issue}");
            } else {
                issues.push(issue);
            }
        }
    }

    /// Removing the package manager (or anything it depends on) from its
    /// own environment is refused.
    fn verify_self_protection(
        &self,
        prefix_data: &PrefixData,
        config: &Config,
        issues: &mut Vec<VerificationIssue>,
    ) {
        let Some(root_prefix) = &config.root_prefix else {
            return;
        };
        if root_prefix != &self.target_prefix {
            return;
        }

        // The protected set: conda itself plus the names it depends on.
        let mut protected: FxHashSet<&str> = FxHashSet::default();
        protected.insert("conda");
        if let Some(conda) = prefix_data.get("conda") {
            for dep in &conda.repodata_record.package_record.depends {
                if let Some(name) = dep.split_whitespace().next() {
                    protected.insert(name);
                }
            }
        }

        for name in &self.unlink_names {
            // A version change of a protected name is fine; only outright
            // removal is refused.
            if self.link_names.contains(name) {
                continue;
            }
            if protected.contains(name.as_str()) {
                issues.push(VerificationIssue::RemoveError { name: name.clone() });
            }
        }
    }

    /// Checks the extracted files of every link group against the sizes and
    /// hashes their `paths.json` records.
    fn verify_safety_checks(&self, config: &Config, issues: &mut Vec<VerificationIssue>) {
        if config.safety_checks == SafetyChecks::Disabled {
            return;
        }

        for (dist, package_dir, paths_json) in &self.link_sources {
            for entry in &paths_json.paths {
                if let Err(reason) =
                    krait_cache::validation::validate_package_entry(package_dir, entry)
                {
                    if config.safety_checks == SafetyChecks::Warn {
                        tracing::warn!(
                            "{dist}: '{}' failed its safety check: {reason}",
                            entry.relative_path.display()
                        );
                    } else {
                        issues.push(VerificationIssue::SafetyError {
                            package: dist.clone(),
                            path: entry.relative_path.clone(),
                            reason: reason.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Phase 3: execute the action groups under the prefix lock, rolling
    /// back on failure.
    pub fn execute(
        &mut self,
        config: &Config,
        runner: &dyn SubprocessRunner,
        menu_installer: Option<&dyn MenuInstaller>,
    ) -> Result<(), TransactionError> {
        fs_err::create_dir_all(self.target_prefix.join("conda-meta"))?;
        let _lock = PrefixLock::acquire(&self.target_prefix)?;
        let guard = SignalGuard::install();

        let (allow_symlinks, allow_hardlinks) = self.link_capabilities(config);

        // The context borrows locals rather than `self` so the groups below
        // can be mutated while it is alive.
        let target_prefix = self.target_prefix.clone();
        let target_prefix_str = self.target_prefix_str.clone();
        let python_info = self.python_info.clone();
        let ctx = ActionContext {
            target_prefix: &target_prefix,
            target_prefix_str: &target_prefix_str,
            platform: self.platform,
            python_info: python_info.as_ref(),
            root_prefix: config.root_prefix.as_deref(),
            allow_symlinks,
            allow_hardlinks,
            always_softlink: config.always_softlink,
            runner,
            menu_installer,
        };

        let mut failure: Option<(usize, Option<String>, Option<ActionError>)> = None;

        'groups: for group_idx in 0..self.groups.len() {
            let group = &mut self.groups[group_idx];
            for action_idx in 0..group.actions.len() {
                // The current action always completes; signals take effect
                // between actions.
                if guard.interrupted() {
                    failure = Some((group_idx, group.package.clone(), None));
                    break 'groups;
                }
                let result = group.actions[action_idx].execute(&ctx, &mut group.collected);
                group.executed = action_idx + 1;
                if let Err(source) = result {
                    failure = Some((group_idx, group.package.clone(), Some(source)));
                    break 'groups;
                }
            }
        }

        let result = match failure {
            None => Ok(()),
            Some((failed_group, package, source)) => {
                let rollback_errors = if config.rollback_enabled {
                    rollback(&self.groups, failed_group, &ctx, &guard)
                } else {
                    tracing::warn!("rollback is disabled, leaving the prefix as-is");
                    Vec::new()
                };
                match source {
                    Some(source) => Err(TransactionError::ExecutionFailed {
                        package,
                        source,
                        rollback_errors,
                        rolled_back: config.rollback_enabled,
                    }),
                    None => Err(TransactionError::Cancelled { rollback_errors }),
                }
            }
        };

        if result.is_ok() {
            // The trashed files of the unlink half are no longer needed.
            if let Err(e) = empty_trash(&self.target_prefix) {
                tracing::warn!("failed to empty the trash: {e}");
            }
        }
        PrefixData::invalidate(&self.target_prefix);
        result
    }

    fn link_capabilities(&self, config: &Config) -> (bool, bool) {
        if config.always_copy {
            return (false, false);
        }
        if config.always_softlink {
            return (true, false);
        }

        let probe_dir = self
            .link_sources
            .first()
            .map(|(_, dir, _)| dir.clone())
            .unwrap_or_else(|| self.target_prefix.clone());
        let allow_hardlinks = can_create_hardlinks(&self.target_prefix, &probe_dir);
        let allow_symlinks = if self.platform.is_windows() {
            config.allow_softlinks && can_create_symlinks(&self.target_prefix)
        } else {
            can_create_symlinks(&self.target_prefix)
        };
        (allow_symlinks, allow_hardlinks)
    }

    fn action_context<'a>(
        &'a self,
        config: &'a Config,
        runner: &'a dyn SubprocessRunner,
        menu_installer: Option<&'a dyn MenuInstaller>,
        allow_symlinks: bool,
        allow_hardlinks: bool,
    ) -> ActionContext<'a> {
        ActionContext {
            target_prefix: &self.target_prefix,
            target_prefix_str: &self.target_prefix_str,
            platform: self.platform,
            python_info: self.python_info.as_ref(),
            root_prefix: config.root_prefix.as_deref(),
            allow_symlinks,
            allow_hardlinks,
            always_softlink: config.always_softlink,
            runner,
            menu_installer,
        }
    }
}

/// Reverses the failing group from its last executed action backwards, then
/// every earlier group in reverse order. Rollback is best effort: errors are
/// collected, and a second interrupt abandons it.
fn rollback(
    groups: &[ActionGroup],
    failed_group: usize,
    ctx: &ActionContext<'_>,
    guard: &SignalGuard,
) -> Vec<ActionError> {
    let mut errors = Vec::new();

    for group_idx in (0..=failed_group).rev() {
        let group = &groups[group_idx];
        for action_idx in (0..group.executed).rev() {
            if guard.interrupted_twice() {
                tracing::warn!("second interrupt received, abandoning rollback");
                return errors;
            }
            if let Err(e) = group.actions[action_idx].reverse(ctx) {
                // A rollback failure never stops the remaining rollbacks.
                errors.push(e);
            }
        }
    }
    errors
}

fn is_menu_file(path: &Path) -> bool {
    (path.starts_with("Menu") || path.starts_with("menu"))
        && path.extension().map(|ext| ext == "json").unwrap_or(false)
}

/// The advisory lock serializing transactions on one prefix. Concurrent
/// attempts fail fast instead of queueing.
pub(crate) struct PrefixLock {
    _lock: fslock::LockFile,
    path: PathBuf,
}

impl PrefixLock {
    fn acquire(prefix: &Path) -> Result<Self, TransactionError> {
        let path = prefix.join("conda-meta").join("krait.lock");
        let mut lock = fslock::LockFile::open(path.as_os_str())
            .map_err(|e| TransactionError::LockError(prefix.to_path_buf(), e.to_string()))?;
        let acquired = lock
            .try_lock()
            .map_err(|e| TransactionError::LockError(prefix.to_path_buf(), e.to_string()))?;
        if !acquired {
            return Err(TransactionError::LockError(
                prefix.to_path_buf(),
                "another transaction is in progress".to_owned(),
            ));
        }
        Ok(Self { _lock: lock, path })
    }
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
