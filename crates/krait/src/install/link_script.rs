//! Running the pre/post scripts a package ships.
//!
//! Packages may carry `bin/.<name>-pre-link.sh`, `bin/.<name>-post-link.sh`
//! and `bin/.<name>-pre-unlink.sh` (`.bat` under `Scripts/` on windows).
//! Scripts run through the subprocess collaborator with the conventional
//! `PREFIX`/`PKG_*` environment.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

use krait_conda_types::{PackageRecord, Platform};

/// The subprocess collaborator: the core never spawns processes itself.
pub trait SubprocessRunner: Send + Sync {
    /// Runs the command and returns its exit code.
    fn run(
        &self,
        argv: &[String],
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> std::io::Result<i32>;
}

/// The default collaborator implementation backed by [`std::process`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdSubprocessRunner;

impl SubprocessRunner for StdSubprocessRunner {
    fn run(
        &self,
        argv: &[String],
        env: &HashMap<String, String>,
        cwd: &Path,
    ) -> std::io::Result<i32> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line")
        })?;
        let status = std::process::Command::new(program)
            .args(args)
            .envs(env)
            .current_dir(cwd)
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// The windows menu collaborator, invoked for `menu/*.json` files.
pub trait MenuInstaller: Send + Sync {
    /// Creates (or with `remove` set, deletes) the shortcuts described by
    /// the menu file.
    fn install(&self, prefix: &Path, menu_file: &Path, remove: bool) -> std::io::Result<()>;
}

/// The kinds of link scripts a package can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScriptType {
    /// Runs before the package's files are linked.
    PreLink,
    /// Runs after the package's files are linked.
    PostLink,
    /// Runs before the package's files are removed.
    PreUnlink,
}

impl LinkScriptType {
    /// The path of the script within the prefix, which encodes the package
    /// name.
    pub fn path(&self, record: &PackageRecord, platform: Platform) -> String {
        let name = record.name.as_normalized();
        let (dir, suffix, ext) = if platform.is_windows() {
            ("Scripts", self.suffix(), "bat")
        } else {
            ("bin", self.suffix(), "sh")
        };
        format!("{dir}/.{name}-{suffix}.{ext}")
    }

    fn suffix(&self) -> &'static str {
        match self {
            LinkScriptType::PreLink => "pre-link",
            LinkScriptType::PostLink => "post-link",
            LinkScriptType::PreUnlink => "pre-unlink",
        }
    }
}

impl Display for LinkScriptType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// An error from running a link script.
#[derive(Debug, thiserror::Error)]
pub enum LinkScriptError {
    /// The script could not be spawned.
    #[error("failed to run {0} script")]
    FailedToRun(String, #[source] std::io::Error),

    /// The script ran but exited nonzero.
    #[error("the {0} script of '{1}' failed with exit code {2}")]
    ScriptFailed(String, String, i32),
}

/// Runs the given link script of a package if the package ships one.
///
/// `script_root` is where the script file is looked up: the prefix for
/// post-link and pre-unlink scripts, the extracted package directory for
/// pre-link scripts (whose file is not linked yet when they run).
pub fn run_link_script(
    script_type: LinkScriptType,
    record: &PackageRecord,
    script_root: &Path,
    target_prefix: &Path,
    root_prefix: Option<&Path>,
    platform: Platform,
    runner: &dyn SubprocessRunner,
) -> Result<(), LinkScriptError> {
    let script = script_root.join(script_type.path(record, platform));
    if !script.is_file() {
        return Ok(());
    }

    let mut env = HashMap::new();
    env.insert(
        "PREFIX".to_owned(),
        target_prefix.to_string_lossy().into_owned(),
    );
    env.insert(
        "PKG_NAME".to_owned(),
        record.name.as_normalized().to_owned(),
    );
    env.insert("PKG_VERSION".to_owned(), record.version.to_string());
    env.insert("PKG_BUILDNUM".to_owned(), record.build_number.to_string());
    env.insert(
        "ROOT_PREFIX".to_owned(),
        root_prefix
            .unwrap_or(target_prefix)
            .to_string_lossy()
            .into_owned(),
    );

    let argv = if platform.is_windows() {
        vec![
            "cmd.exe".to_owned(),
            "/c".to_owned(),
            script.to_string_lossy().into_owned(),
        ]
    } else {
        vec![
            "/bin/sh".to_owned(),
            script.to_string_lossy().into_owned(),
        ]
    };

    tracing::info!(
        "running {script_type} script for {}",
        record.name.as_normalized()
    );
    let exit_code = runner
        .run(&argv, &env, target_prefix)
        .map_err(|e| LinkScriptError::FailedToRun(script_type.to_string(), e))?;

    if exit_code != 0 {
        return Err(LinkScriptError::ScriptFailed(
            script_type.to_string(),
            record.name.as_normalized().to_owned(),
            exit_code,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{run_link_script, LinkScriptType, SubprocessRunner};
    use krait_conda_types::{PackageName, PackageRecord, Platform, Version};
    use std::collections::HashMap;
    use std::path::Path;
    use std::str::FromStr;
    use std::sync::Mutex;

    struct RecordingRunner {
        calls: Mutex<Vec<(Vec<String>, HashMap<String, String>)>>,
        exit_code: i32,
    }

    impl SubprocessRunner for RecordingRunner {
        fn run(
            &self,
            argv: &[String],
            env: &HashMap<String, String>,
            _cwd: &Path,
        ) -> std::io::Result<i32> {
            self.calls
                .lock()
                .unwrap()
                .push((argv.to_vec(), env.clone()));
            Ok(self.exit_code)
        }
    }

    fn record() -> PackageRecord {
        let mut record = PackageRecord::new(
            PackageName::new_unchecked("spiffy"),
            Version::from_str("0.5").unwrap(),
            "0".to_owned(),
        );
        record.build_number = 3;
        record
    }

    #[test]
    fn script_paths() {
        assert_eq!(
            LinkScriptType::PostLink.path(&record(), Platform::Linux64),
            "bin/.spiffy-post-link.sh"
        );
        assert_eq!(
            LinkScriptType::PreUnlink.path(&record(), Platform::Win64),
            "Scripts/.spiffy-pre-unlink.bat"
        );
    }

    #[test]
    fn missing_script_is_a_noop() {
        let prefix = tempfile::tempdir().unwrap();
        let runner = RecordingRunner {
            calls: Mutex::new(Vec::new()),
            exit_code: 0,
        };
        run_link_script(
            LinkScriptType::PostLink,
            &record(),
            prefix.path(),
            prefix.path(),
            None,
            Platform::Linux64,
            &runner,
        )
        .unwrap();
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn script_runs_with_package_environment() {
        let prefix = tempfile::tempdir().unwrap();
        let script = prefix.path().join("bin/.spiffy-post-link.sh");
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();

        let runner = RecordingRunner {
            calls: Mutex::new(Vec::new()),
            exit_code: 0,
        };
        run_link_script(
            LinkScriptType::PostLink,
            &record(),
            prefix.path(),
            prefix.path(),
            Some(Path::new("/opt/krait")),
            Platform::Linux64,
            &runner,
        )
        .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (argv, env) = &calls[0];
        assert_eq!(argv[0], "/bin/sh");
        assert_eq!(env.get("PKG_NAME").map(String::as_str), Some("spiffy"));
        assert_eq!(env.get("PKG_VERSION").map(String::as_str), Some("0.5"));
        assert_eq!(env.get("PKG_BUILDNUM").map(String::as_str), Some("3"));
        assert_eq!(env.get("ROOT_PREFIX").map(String::as_str), Some("/opt/krait"));
        assert!(env.contains_key("PREFIX"));
    }

    #[test]
    fn nonzero_exit_is_an_error() {
        let prefix = tempfile::tempdir().unwrap();
        let script = prefix.path().join("bin/.spiffy-pre-link.sh");
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "#!/bin/sh\nexit 1\n").unwrap();

        let runner = RecordingRunner {
            calls: Mutex::new(Vec::new()),
            exit_code: 7,
        };
        let err = run_link_script(
            LinkScriptType::PreLink,
            &record(),
            prefix.path(),
            prefix.path(),
            None,
            Platform::Linux64,
            &runner,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exit code 7"));
    }
}
