//! The leaf operations of a transaction.
//!
//! Every mutation of a prefix is represented as a [`PathAction`] with three
//! methods: `verify` performs pure checks, `execute` performs the mutation,
//! and `reverse` undoes it — also when `execute` failed halfway through.
//! Deletions go through the prefix trash so `reverse` can restore the exact
//! bytes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use krait_conda_types::history::{History, HistoryError, Revision};
use krait_conda_types::package::{EntryPoint, FileMode, PathsEntry};
use krait_conda_types::prefix_record;
use krait_conda_types::prefix_record::{Link, PrefixRecord};
use krait_conda_types::{PackageRecord, Platform, RepoDataRecord};

use super::entry_point::{
    create_unix_python_entry_point, create_windows_python_entry_point,
};
use super::link::{link_file, LinkFileError};
use super::link_script::{
    run_link_script, LinkScriptError, LinkScriptType, MenuInstaller, SubprocessRunner,
};
use super::python::PythonInfo;
use super::unlink::{move_to_trash, restore_from_trash, UnlinkError};

/// Everything an action needs to run; threaded through by the transaction.
pub struct ActionContext<'a> {
    /// The prefix being mutated.
    pub target_prefix: &'a Path,

    /// The prefix as a string, written into files with placeholder
    /// rewriting.
    pub target_prefix_str: &'a str,

    /// The platform the transaction runs for.
    pub platform: Platform,

    /// The python interpreter of the post-transaction state, if any.
    pub python_info: Option<&'a PythonInfo>,

    /// The root prefix of the installation, exported to link scripts.
    pub root_prefix: Option<&'a Path>,

    /// Whether symbolic links may be used.
    pub allow_symlinks: bool,

    /// Whether hard links may be used.
    pub allow_hardlinks: bool,

    /// Whether regular files are soft-linked instead of hard-linked.
    pub always_softlink: bool,

    /// The subprocess collaborator.
    pub runner: &'a dyn SubprocessRunner,

    /// The menu collaborator, windows only.
    pub menu_installer: Option<&'a dyn MenuInstaller>,
}

/// An error from a single action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// A source file of a link action does not exist in the package cache.
    #[error("the source file '{0}' is missing from the package cache")]
    SourceMissing(PathBuf),

    /// Linking a file failed.
    #[error("failed to link '{0}'")]
    LinkFailed(PathBuf, #[source] LinkFileError),

    /// A noarch python package is installed without a python interpreter in
    /// the environment.
    #[error("cannot install noarch python files because the environment has no python")]
    MissingPythonInfo,

    /// Creating a directory failed.
    #[error("failed to create directory '{0}'")]
    CreateDirectoryFailed(PathBuf, #[source] std::io::Error),

    /// Writing a file failed.
    #[error("failed to write '{0}'")]
    WriteFailed(PathBuf, #[source] std::io::Error),

    /// Removing a path failed.
    #[error(transparent)]
    UnlinkFailed(#[from] UnlinkError),

    /// A pre/post link script failed.
    #[error(transparent)]
    LinkScriptFailed(#[from] LinkScriptError),

    /// Appending to the history failed.
    #[error(transparent)]
    HistoryFailed(#[from] HistoryError),

    /// The menu collaborator failed.
    #[error("failed to install menu entry '{0}'")]
    MenuFailed(PathBuf, #[source] std::io::Error),
}

/// One leaf operation of a transaction.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum PathAction {
    /// Create a directory in the prefix.
    CreateDirectory(CreateDirectoryAction),
    /// Link one file from the package cache into the prefix.
    LinkPath(LinkPathAction),
    /// Materialize a python entry point.
    CreatePythonEntryPoint(CreatePythonEntryPointAction),
    /// Byte-compile the python files of a noarch package.
    CompilePyc(CompilePycAction),
    /// Install a menu shortcut through the collaborator.
    MakeMenu(MakeMenuAction),
    /// Write the prefix record JSON into `conda-meta`.
    CreatePrefixRecord(CreatePrefixRecordAction),
    /// Run a pre/post link script.
    RunLinkScript(RunLinkScriptAction),
    /// Remove one file from the prefix.
    UnlinkPath(UnlinkPathAction),
    /// Remove a now-empty directory.
    RemoveDirectory(RemoveDirectoryAction),
    /// Remove the prefix record JSON from `conda-meta`.
    RemovePrefixRecord(RemovePrefixRecordAction),
    /// Append the transaction to the history file.
    AppendHistory(AppendHistoryAction),
}

impl PathAction {
    /// Pure checks against the prefix and sources; never mutates anything
    /// and is idempotent.
    pub fn verify(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        match self {
            PathAction::CreateDirectory(_)
            | PathAction::MakeMenu(_)
            | PathAction::UnlinkPath(_)
            | PathAction::RemoveDirectory(_)
            | PathAction::RemovePrefixRecord(_)
            | PathAction::RunLinkScript(_)
            | PathAction::AppendHistory(_)
            | PathAction::CreatePrefixRecord(_) => Ok(()),
            PathAction::LinkPath(action) => action.verify(ctx),
            PathAction::CreatePythonEntryPoint(_) | PathAction::CompilePyc(_) => {
                if ctx.python_info.is_none() {
                    Err(ActionError::MissingPythonInfo)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Performs the mutation. Produced prefix-record entries are pushed into
    /// `collected`, which the record-writing action of the group consumes.
    pub fn execute(
        &mut self,
        ctx: &ActionContext<'_>,
        collected: &mut Vec<prefix_record::PathsEntry>,
    ) -> Result<(), ActionError> {
        match self {
            PathAction::CreateDirectory(action) => action.execute(ctx),
            PathAction::LinkPath(action) => action.execute(ctx, collected),
            PathAction::CreatePythonEntryPoint(action) => action.execute(ctx, collected),
            PathAction::CompilePyc(action) => action.execute(ctx, collected),
            PathAction::MakeMenu(action) => action.execute(ctx),
            PathAction::CreatePrefixRecord(action) => action.execute(ctx, collected),
            PathAction::RunLinkScript(action) => action.execute(ctx),
            PathAction::UnlinkPath(action) => action.execute(ctx),
            PathAction::RemoveDirectory(action) => action.execute(ctx),
            PathAction::RemovePrefixRecord(action) => action.execute(ctx),
            PathAction::AppendHistory(action) => action.execute(ctx),
        }
    }

    /// Undoes whatever `execute` did, including partial effects when it
    /// failed midway.
    pub fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        match self {
            PathAction::CreateDirectory(action) => action.reverse(ctx),
            PathAction::LinkPath(action) => action.reverse(ctx),
            PathAction::CreatePythonEntryPoint(action) => action.reverse(ctx),
            PathAction::CompilePyc(action) => action.reverse(ctx),
            PathAction::MakeMenu(action) => action.reverse(ctx),
            PathAction::CreatePrefixRecord(action) => action.reverse(ctx),
            PathAction::RunLinkScript(_) => Ok(()),
            PathAction::UnlinkPath(action) => action.reverse(ctx),
            PathAction::RemoveDirectory(action) => action.reverse(ctx),
            PathAction::RemovePrefixRecord(action) => action.reverse(ctx),
            PathAction::AppendHistory(action) => action.reverse(ctx),
        }
    }

    /// The prefix-relative paths this action will create, used for the
    /// clobber analysis of the verify phase.
    pub fn created_paths(&self, ctx: &ActionContext<'_>) -> Vec<PathBuf> {
        match self {
            PathAction::LinkPath(action) => vec![action.target_relative.clone()],
            PathAction::CreatePythonEntryPoint(action) => {
                let Some(python_info) = ctx.python_info else {
                    return Vec::new();
                };
                if ctx.platform.is_windows() {
                    vec![
                        python_info
                            .bin_dir
                            .join(format!("{}-script.py", action.entry_point.command)),
                        python_info
                            .bin_dir
                            .join(format!("{}.bat", action.entry_point.command)),
                    ]
                } else {
                    vec![python_info.bin_dir.join(&action.entry_point.command)]
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Creates a directory (and its missing parents) in the prefix.
#[derive(Debug)]
pub struct CreateDirectoryAction {
    /// The prefix-relative directory.
    pub relative_path: PathBuf,
    created: bool,
}

impl CreateDirectoryAction {
    /// A new, not yet executed action.
    pub fn new(relative_path: PathBuf) -> Self {
        Self {
            relative_path,
            created: false,
        }
    }

    fn execute(&mut self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let path = ctx.target_prefix.join(&self.relative_path);
        if path.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(&path)
            .map_err(|e| ActionError::CreateDirectoryFailed(path, e))?;
        self.created = true;
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        if self.created {
            // Only remove what this action created, and only when empty.
            let _ = std::fs::remove_dir(ctx.target_prefix.join(&self.relative_path));
        }
        Ok(())
    }
}

/// Links one file from an extracted package into the prefix, choosing
/// hard-link, soft-link or copy and rewriting the placeholder prefix where
/// the package requires it.
#[derive(Debug)]
pub struct LinkPathAction {
    /// The extracted package directory the file comes from.
    pub package_dir: PathBuf,
    /// The `paths.json` entry describing the file.
    pub entry: PathsEntry,
    /// Where the file lands, relative to the prefix (after noarch
    /// remapping).
    pub target_relative: PathBuf,
    executed: bool,
}

impl LinkPathAction {
    /// A new, not yet executed action.
    pub fn new(package_dir: PathBuf, entry: PathsEntry, target_relative: PathBuf) -> Self {
        Self {
            package_dir,
            entry,
            target_relative,
            executed: false,
        }
    }

    fn verify(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let source = self.package_dir.join(&self.entry.relative_path);
        if !source.exists() && !source.is_symlink() {
            return Err(ActionError::SourceMissing(source));
        }

        // An overlong prefix cannot be patched into a binary; surface it
        // during verification instead of halfway through execution.
        if let Some(placeholder) = self.entry.prefix_placeholder.as_deref() {
            if self.entry.file_mode == FileMode::Binary
                && ctx.target_prefix_str.len() > placeholder.len()
            {
                return Err(ActionError::LinkFailed(
                    self.entry.relative_path.clone(),
                    LinkFileError::PaddingError {
                        placeholder: placeholder.to_owned(),
                        target_prefix: ctx.target_prefix_str.to_owned(),
                    },
                ));
            }
        }
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &ActionContext<'_>,
        collected: &mut Vec<prefix_record::PathsEntry>,
    ) -> Result<(), ActionError> {
        let destination = ctx.target_prefix.join(&self.target_relative);
        self.executed = true;

        let linked = link_file(
            &self.entry,
            &self.package_dir,
            &destination,
            ctx.target_prefix_str,
            ctx.allow_symlinks,
            ctx.allow_hardlinks,
            ctx.always_softlink,
            ctx.platform,
        )
        .map_err(|e| ActionError::LinkFailed(self.entry.relative_path.clone(), e))?;

        collected.push(prefix_record::PathsEntry {
            relative_path: self.target_relative.clone(),
            path_type: self.entry.path_type.into(),
            sha256: self.entry.sha256,
            sha256_in_prefix: Some(linked.sha256),
            size_in_bytes: Some(linked.file_size),
            file_mode: match linked.method {
                super::link::LinkMethod::Patched(mode) => Some(mode),
                _ => None,
            },
            prefix_placeholder: self.entry.prefix_placeholder.clone(),
        });
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        if self.executed {
            let destination = ctx.target_prefix.join(&self.target_relative);
            match std::fs::remove_file(&destination) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(ActionError::WriteFailed(destination, e)),
            }
        }
        Ok(())
    }
}

/// Materializes one python entry point in the bin directory.
#[derive(Debug)]
pub struct CreatePythonEntryPointAction {
    /// The entry point to create.
    pub entry_point: EntryPoint,
    created: Vec<PathBuf>,
}

impl CreatePythonEntryPointAction {
    /// A new, not yet executed action.
    pub fn new(entry_point: EntryPoint) -> Self {
        Self {
            entry_point,
            created: Vec::new(),
        }
    }

    fn execute(
        &mut self,
        ctx: &ActionContext<'_>,
        collected: &mut Vec<prefix_record::PathsEntry>,
    ) -> Result<(), ActionError> {
        let python_info = ctx.python_info.ok_or(ActionError::MissingPythonInfo)?;

        let entries = if ctx.platform.is_windows() {
            create_windows_python_entry_point(
                ctx.target_prefix,
                ctx.target_prefix_str,
                &self.entry_point,
                python_info,
            )
            .map_err(|e| {
                ActionError::WriteFailed(PathBuf::from(&self.entry_point.command), e)
            })?
            .to_vec()
        } else {
            vec![create_unix_python_entry_point(
                ctx.target_prefix,
                ctx.target_prefix_str,
                &self.entry_point,
                python_info,
            )
            .map_err(|e| {
                ActionError::WriteFailed(PathBuf::from(&self.entry_point.command), e)
            })?]
        };

        for entry in entries {
            self.created.push(entry.relative_path.clone());
            collected.push(entry);
        }
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        for relative in &self.created {
            let path = ctx.target_prefix.join(relative);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(ActionError::WriteFailed(path, e)),
            }
        }
        Ok(())
    }
}

/// Byte-compiles the `.py` files of a noarch python package with the
/// environment's interpreter.
#[derive(Debug)]
pub struct CompilePycAction {
    /// The prefix-relative python files to compile.
    pub py_files: Vec<PathBuf>,
    produced: Vec<PathBuf>,
}

impl CompilePycAction {
    /// A new, not yet executed action.
    pub fn new(py_files: Vec<PathBuf>) -> Self {
        Self {
            py_files,
            produced: Vec::new(),
        }
    }

    /// The path of the compiled module for a source file, e.g.
    /// `pkg/mod.py` → `pkg/__pycache__/mod.cpython-311.pyc`.
    fn pyc_path(py_file: &Path, python_info: &PythonInfo) -> Option<PathBuf> {
        let stem = py_file.file_stem()?;
        let (major, minor) = python_info.short_version;
        let file_name = format!(
            "{}.cpython-{major}{minor}.pyc",
            stem.to_string_lossy()
        );
        Some(
            py_file
                .parent()
                .unwrap_or(Path::new(""))
                .join("__pycache__")
                .join(file_name),
        )
    }

    fn execute(
        &mut self,
        ctx: &ActionContext<'_>,
        collected: &mut Vec<prefix_record::PathsEntry>,
    ) -> Result<(), ActionError> {
        let python_info = ctx.python_info.ok_or(ActionError::MissingPythonInfo)?;
        if self.py_files.is_empty() {
            return Ok(());
        }

        let python = ctx.target_prefix.join(python_info.path());
        let mut argv = vec![
            python.to_string_lossy().into_owned(),
            "-Wi".to_owned(),
            "-m".to_owned(),
            "py_compile".to_owned(),
        ];
        argv.extend(
            self.py_files
                .iter()
                .map(|f| f.to_string_lossy().into_owned()),
        );

        // Compilation failures are tolerated: some packages ship py2-only
        // or intentionally broken sources.
        match ctx
            .runner
            .run(&argv, &std::collections::HashMap::new(), ctx.target_prefix)
        {
            Ok(0) => {}
            Ok(code) => {
                tracing::warn!("pyc compilation exited with {code}, continuing");
            }
            Err(e) => {
                tracing::warn!("pyc compilation failed to run: {e}, continuing");
            }
        }

        for py_file in &self.py_files {
            let Some(pyc) = Self::pyc_path(py_file, python_info) else {
                continue;
            };
            if ctx.target_prefix.join(&pyc).is_file() {
                self.produced.push(pyc.clone());
                collected.push(prefix_record::PathsEntry {
                    relative_path: pyc,
                    path_type: prefix_record::PathType::PycFile,
                    sha256: None,
                    sha256_in_prefix: None,
                    size_in_bytes: None,
                    file_mode: None,
                    prefix_placeholder: None,
                });
            }
        }
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        for relative in &self.produced {
            let _ = std::fs::remove_file(ctx.target_prefix.join(relative));
        }
        Ok(())
    }
}

/// Installs a menu shortcut through the windows menu collaborator.
#[derive(Debug)]
pub struct MakeMenuAction {
    /// The prefix-relative `menu/*.json` file.
    pub menu_file: PathBuf,
    installed: bool,
}

impl MakeMenuAction {
    /// A new, not yet executed action.
    pub fn new(menu_file: PathBuf) -> Self {
        Self {
            menu_file,
            installed: false,
        }
    }

    fn execute(&mut self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let Some(menu_installer) = ctx.menu_installer else {
            return Ok(());
        };
        let path = ctx.target_prefix.join(&self.menu_file);
        menu_installer
            .install(ctx.target_prefix, &path, false)
            .map_err(|e| ActionError::MenuFailed(self.menu_file.clone(), e))?;
        self.installed = true;
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        if self.installed {
            if let Some(menu_installer) = ctx.menu_installer {
                let path = ctx.target_prefix.join(&self.menu_file);
                menu_installer
                    .install(ctx.target_prefix, &path, true)
                    .map_err(|e| ActionError::MenuFailed(self.menu_file.clone(), e))?;
            }
        }
        Ok(())
    }
}

/// Serializes the [`PrefixRecord`] of a freshly linked package into
/// `conda-meta`, consuming the entries collected by the preceding file
/// actions of the group.
#[derive(Debug)]
pub struct CreatePrefixRecordAction {
    /// The repodata record of the package.
    pub record: RepoDataRecord,
    /// The extracted package directory the files were linked from.
    pub extracted_package_dir: PathBuf,
    /// The spec string that requested this package, if it was explicit.
    pub requested_spec: Option<String>,
    written: Option<PathBuf>,
}

impl CreatePrefixRecordAction {
    /// A new, not yet executed action.
    pub fn new(
        record: RepoDataRecord,
        extracted_package_dir: PathBuf,
        requested_spec: Option<String>,
    ) -> Self {
        Self {
            record,
            extracted_package_dir,
            requested_spec,
            written: None,
        }
    }

    fn execute(
        &mut self,
        ctx: &ActionContext<'_>,
        collected: &mut Vec<prefix_record::PathsEntry>,
    ) -> Result<(), ActionError> {
        let prefix_record = PrefixRecord::from_repodata_record(
            self.record.clone(),
            None,
            Some(self.extracted_package_dir.clone()),
            std::mem::take(collected),
            self.requested_spec.clone(),
            Some(Link {
                source: self.extracted_package_dir.clone(),
                link_type: None,
            }),
        );

        let path = ctx
            .target_prefix
            .join("conda-meta")
            .join(prefix_record.file_name());
        prefix_record
            .write_to_path(&path, true)
            .map_err(|e| ActionError::WriteFailed(path.clone(), e))?;
        self.written = Some(path);
        Ok(())
    }

    fn reverse(&self, _ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        if let Some(path) = &self.written {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(ActionError::WriteFailed(path.clone(), e)),
            }
        }
        Ok(())
    }
}

/// Runs a pre/post link script of a package. Scripts are not reversible;
/// `reverse` is a no-op.
#[derive(Debug)]
pub struct RunLinkScriptAction {
    /// The package whose script runs.
    pub record: Box<PackageRecord>,
    /// Which script runs.
    pub script_type: LinkScriptType,
    /// Where the script file lives: the extracted package directory for
    /// pre-link scripts, the prefix otherwise. `None` means the prefix.
    pub script_root: Option<PathBuf>,
}

impl RunLinkScriptAction {
    /// A new, not yet executed action.
    pub fn new(
        record: PackageRecord,
        script_type: LinkScriptType,
        script_root: Option<PathBuf>,
    ) -> Self {
        Self {
            record: Box::new(record),
            script_type,
            script_root,
        }
    }

    fn execute(&mut self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        run_link_script(
            self.script_type,
            &self.record,
            self.script_root.as_deref().unwrap_or(ctx.target_prefix),
            ctx.target_prefix,
            ctx.root_prefix,
            ctx.platform,
            ctx.runner,
        )?;
        Ok(())
    }
}

/// Removes one file of an unlinked package, going through the trash so the
/// removal can be reversed and works on locked files.
#[derive(Debug)]
pub struct UnlinkPathAction {
    /// The prefix-relative file to remove.
    pub relative_path: PathBuf,
    trashed: Option<PathBuf>,
}

impl UnlinkPathAction {
    /// A new, not yet executed action.
    pub fn new(relative_path: PathBuf) -> Self {
        Self {
            relative_path,
            trashed: None,
        }
    }

    fn execute(&mut self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let path = ctx.target_prefix.join(&self.relative_path);
        if !path.exists() && !path.is_symlink() {
            // Already gone; nothing to undo either.
            return Ok(());
        }
        self.trashed = Some(move_to_trash(ctx.target_prefix, &path)?);
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        if let Some(trashed) = &self.trashed {
            restore_from_trash(trashed, &ctx.target_prefix.join(&self.relative_path))?;
        }
        Ok(())
    }
}

/// Removes a directory that the unlink of a package left empty. Ordered by
/// depth, deepest first.
#[derive(Debug)]
pub struct RemoveDirectoryAction {
    /// The prefix-relative directory.
    pub relative_path: PathBuf,
    removed: bool,
}

impl RemoveDirectoryAction {
    /// A new, not yet executed action.
    pub fn new(relative_path: PathBuf) -> Self {
        Self {
            relative_path,
            removed: false,
        }
    }

    fn execute(&mut self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        // Best effort: a directory that still has files (from another
        // package, or untracked) simply stays.
        if std::fs::remove_dir(ctx.target_prefix.join(&self.relative_path)).is_ok() {
            self.removed = true;
        }
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        if self.removed {
            let path = ctx.target_prefix.join(&self.relative_path);
            std::fs::create_dir_all(&path)
                .map_err(|e| ActionError::CreateDirectoryFailed(path, e))?;
        }
        Ok(())
    }
}

/// Removes the `conda-meta` JSON of an unlinked package, via the trash.
#[derive(Debug)]
pub struct RemovePrefixRecordAction {
    /// The file name of the record inside `conda-meta`.
    pub file_name: String,
    trashed: Option<PathBuf>,
}

impl RemovePrefixRecordAction {
    /// A new, not yet executed action.
    pub fn new(file_name: String) -> Self {
        Self {
            file_name,
            trashed: None,
        }
    }

    fn execute(&mut self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let path = ctx.target_prefix.join("conda-meta").join(&self.file_name);
        if !path.exists() {
            return Ok(());
        }
        self.trashed = Some(move_to_trash(ctx.target_prefix, &path)?);
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        if let Some(trashed) = &self.trashed {
            restore_from_trash(
                trashed,
                &ctx.target_prefix.join("conda-meta").join(&self.file_name),
            )?;
        }
        Ok(())
    }
}

/// Appends the revision block of this transaction to the history file. The
/// reverse truncates the file back to its previous length, keeping the log
/// append-only in the success path.
#[derive(Debug)]
pub struct AppendHistoryAction {
    /// The revision to append.
    pub revision: Revision,
    /// The command line that caused the transaction.
    pub cmd: Option<String>,
    /// The action name and the specs the user requested.
    pub action_specs: Option<(String, Vec<String>)>,
    previous_len: Option<u64>,
}

impl AppendHistoryAction {
    /// A new, not yet executed action.
    pub fn new(
        revision: Revision,
        cmd: Option<String>,
        action_specs: Option<(String, Vec<String>)>,
    ) -> Self {
        Self {
            revision,
            cmd,
            action_specs,
            previous_len: None,
        }
    }

    fn execute(&mut self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let history = History::new(ctx.target_prefix);
        self.previous_len = Some(
            history
                .path()
                .metadata()
                .map(|metadata| metadata.len())
                .unwrap_or(0),
        );
        history.append_revision(
            &self.revision,
            self.cmd.as_deref(),
            self.action_specs
                .as_ref()
                .map(|(action, specs)| (action.as_str(), specs.as_slice())),
        )?;
        Ok(())
    }

    fn reverse(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let Some(previous_len) = self.previous_len else {
            return Ok(());
        };
        let history = History::new(ctx.target_prefix);
        if previous_len == 0 {
            let _ = std::fs::remove_file(history.path());
            return Ok(());
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(history.path())
            .map_err(|e| ActionError::WriteFailed(history.path().to_path_buf(), e))?;
        file.set_len(previous_len)
            .map_err(|e| ActionError::WriteFailed(history.path().to_path_buf(), e))?;
        Ok(())
    }
}
