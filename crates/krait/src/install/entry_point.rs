//! Materializing the python entry points of `noarch: python` packages.
//!
//! On unix an entry point is a single executable python script in the bin
//! directory. On windows a `<command>-script.py` is written next to a
//! `<command>.bat` shim that invokes it with the environment's interpreter.

use std::path::{Path, PathBuf};

use krait_conda_types::package::EntryPoint;
use krait_conda_types::prefix_record::{PathType, PathsEntry};
use krait_digest::{HashingWriter, Sha256};

use super::python::PythonInfo;

/// Creates an entry point on a unix platform and returns the prefix record
/// entry for it.
pub fn create_unix_python_entry_point(
    target_dir: &Path,
    target_prefix: &str,
    entry_point: &EntryPoint,
    python_info: &PythonInfo,
) -> Result<PathsEntry, std::io::Error> {
    let relative_path = python_info.bin_dir.join(&entry_point.command);
    let script_path = target_dir.join(&relative_path);
    if let Some(parent) = script_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = python_entry_point_template(target_prefix, entry_point, python_info);
    let (sha256, size) = write_and_hash(&script_path, &contents)?;

    #[cfg(unix)]
    std::fs::set_permissions(
        &script_path,
        std::os::unix::fs::PermissionsExt::from_mode(0o775),
    )?;

    Ok(PathsEntry {
        relative_path,
        path_type: PathType::UnixPythonEntryPoint,
        sha256: Some(sha256),
        sha256_in_prefix: None,
        size_in_bytes: Some(size as u64),
        file_mode: None,
        prefix_placeholder: None,
    })
}

/// Creates an entry point on windows: the python script plus a `.bat` shim
/// that runs it. Returns the two prefix record entries.
pub fn create_windows_python_entry_point(
    target_dir: &Path,
    target_prefix: &str,
    entry_point: &EntryPoint,
    python_info: &PythonInfo,
) -> Result<[PathsEntry; 2], std::io::Error> {
    let script_relative_path = python_info
        .bin_dir
        .join(format!("{}-script.py", entry_point.command));
    let script_path = target_dir.join(&script_relative_path);
    if let Some(parent) = script_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = python_entry_point_template(target_prefix, entry_point, python_info);
    let (script_sha256, script_size) = write_and_hash(&script_path, &contents)?;

    let launcher_relative_path = python_info
        .bin_dir
        .join(format!("{}.bat", entry_point.command));
    let python = PathBuf::from(target_prefix).join(&python_info.path);
    let launcher_contents = format!(
        "@echo off\r\n\"{}\" \"%~dp0{}-script.py\" %*\r\n",
        python.display(),
        entry_point.command
    );
    let (launcher_sha256, launcher_size) =
        write_and_hash(&target_dir.join(&launcher_relative_path), &launcher_contents)?;

    Ok([
        PathsEntry {
            relative_path: script_relative_path,
            path_type: PathType::WindowsPythonEntryPointScript,
            sha256: Some(script_sha256),
            sha256_in_prefix: None,
            size_in_bytes: Some(script_size as u64),
            file_mode: None,
            prefix_placeholder: None,
        },
        PathsEntry {
            relative_path: launcher_relative_path,
            path_type: PathType::WindowsPythonEntryPointExe,
            sha256: Some(launcher_sha256),
            sha256_in_prefix: None,
            size_in_bytes: Some(launcher_size as u64),
            file_mode: None,
            prefix_placeholder: None,
        },
    ])
}

/// The python source of an entry point script: imports the module and calls
/// the function, exiting with its return value.
pub fn python_entry_point_template(
    target_prefix: &str,
    entry_point: &EntryPoint,
    python_info: &PythonInfo,
) -> String {
    let shebang = python_info.shebang(target_prefix);

    // For `func` of the form `obj.method` only `obj` is importable.
    let (import_name, _) = entry_point
        .function
        .split_once('.')
        .unwrap_or((&entry_point.function, ""));

    let module = &entry_point.module;
    let func = &entry_point.function;
    format!(
        "{shebang}\n\
        # -*- coding: utf-8 -*-\n\
        import re\n\
        import sys\n\n\
        from {module} import {import_name}\n\n\
        if __name__ == '__main__':\n\
        \tsys.argv[0] = re.sub(r'(-script\\.pyw?|\\.exe)?$', '', sys.argv[0])\n\
        \tsys.exit({func}())\n\
        "
    )
}

fn write_and_hash(
    path: &Path,
    contents: impl AsRef<[u8]>,
) -> std::io::Result<(krait_digest::Sha256Hash, usize)> {
    use std::io::Write;
    let bytes = contents.as_ref();
    let mut writer = HashingWriter::<_, Sha256>::new(std::fs::File::create(path)?);
    writer.write_all(bytes)?;
    let (_, hash) = writer.finalize();
    Ok((hash, bytes.len()))
}

#[cfg(test)]
mod test {
    use super::{create_unix_python_entry_point, python_entry_point_template};
    use crate::install::python::PythonInfo;
    use krait_conda_types::package::EntryPoint;
    use krait_conda_types::{Platform, Version};
    use std::str::FromStr;

    fn python_info() -> PythonInfo {
        PythonInfo::from_version(&Version::from_str("3.11.0").unwrap(), Platform::Linux64)
            .unwrap()
    }

    #[test]
    fn template_invokes_the_function() {
        let script = python_entry_point_template(
            "/prefix",
            &EntryPoint::from_str("jupyter-lab = jupyterlab.labapp:main").unwrap(),
            &python_info(),
        );
        assert!(script.starts_with("#!/prefix/bin/python3.11\n"));
        assert!(script.contains("from jupyterlab.labapp import main"));
        assert!(script.contains("sys.exit(main())"));
    }

    #[test]
    fn dotted_function_imports_the_object() {
        let script = python_entry_point_template(
            "/prefix",
            &EntryPoint::from_str("tool = pkg.cli:App.run").unwrap(),
            &python_info(),
        );
        assert!(script.contains("from pkg.cli import App"));
        assert!(script.contains("sys.exit(App.run())"));
    }

    #[test]
    fn unix_entry_point_is_created_executable() {
        let prefix = tempfile::tempdir().unwrap();
        let entry = create_unix_python_entry_point(
            prefix.path(),
            prefix.path().to_str().unwrap(),
            &EntryPoint::from_str("spiffy = spiffy.cli:main").unwrap(),
            &python_info(),
        )
        .unwrap();

        assert_eq!(entry.relative_path, std::path::Path::new("bin/spiffy"));
        let script = prefix.path().join("bin/spiffy");
        assert!(script.is_file());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = script.metadata().unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }
}
