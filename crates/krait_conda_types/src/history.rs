//! Readers and writers for the `conda-meta/history` file of a prefix.
//!
//! Every transaction appends one revision block to the history file:
//!
//! ```text
//! ==> 2024-01-16 14:20:00 <==
//! # cmd: install numpy
//! # install specs: ['numpy']
//! +numpy-1.26.3-py312h1234567_0
//! -numpy-1.26.2-py312h1234567_0
//! ```
//!
//! Revisions are numbered from zero in file order. Because each block records
//! the diff against the previous state, the state at any revision can be
//! recomputed by replaying the log from the start; that is what revision
//! rollback (`install --revision N`) builds on.

use std::{
    collections::BTreeSet,
    io::{Read, Write},
    path::{Path, PathBuf},
};

/// A single parsed revision of a history file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRevision {
    /// The datetime string from the revision header.
    pub timestamp: String,

    /// The package diff lines of this revision. Additions carry a `+` prefix,
    /// removals a `-` prefix; the initial revision may list bare dists.
    pub packages: BTreeSet<String>,

    /// Raw comment lines, including the leading `#`.
    pub comments: Vec<String>,
}

/// Structured data extracted from the comment lines of a revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRequest {
    /// The datetime string from the revision header.
    pub date: String,

    /// The command that was run (from `# cmd: ...`).
    pub cmd: Option<String>,

    /// The action that was performed (`install`, `remove`, `update`, ...).
    pub action: Option<String>,

    /// Specs for install/update/create actions.
    pub update_specs: Vec<String>,

    /// Specs for remove/uninstall actions.
    pub remove_specs: Vec<String>,
}

/// An error that can occur while reading or writing a history file.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// An IO error occurred.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// The data appended to the history file by one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Revision {
    /// Timestamp in `YYYY-MM-DD HH:MM:SS` format.
    pub timestamp: String,

    /// Dist strings removed in this revision.
    pub removed: BTreeSet<String>,

    /// Dist strings added in this revision.
    pub added: BTreeSet<String>,
}

/// The parsed contents of a history file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHistory {
    /// The revisions in file order. Revision numbers are indexes into this
    /// list.
    pub revisions: Vec<HistoryRevision>,
}

impl ParsedHistory {
    /// Returns the number of revisions.
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Returns true when the history holds no revisions.
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Returns the most recent revision, if any.
    pub fn latest(&self) -> Option<&HistoryRevision> {
        self.revisions.last()
    }

    /// Computes the set of installed dist strings at the given revision by
    /// replaying additions and removals from revision zero.
    pub fn state_at(&self, revision: usize) -> BTreeSet<String> {
        let mut state = BTreeSet::new();
        for rev in self.revisions.iter().take(revision + 1) {
            for line in &rev.packages {
                if let Some(removed) = line.strip_prefix('-') {
                    state.remove(removed);
                } else if let Some(added) = line.strip_prefix('+') {
                    state.insert(added.to_owned());
                } else {
                    state.insert(line.clone());
                }
            }
        }
        state
    }

    /// Returns the (unlink, link) dist-string diff required to bring the
    /// latest state back to the state at `target` revision.
    pub fn revert_diff(&self, target: usize) -> (BTreeSet<String>, BTreeSet<String>) {
        let current = match self.revisions.len() {
            0 => BTreeSet::new(),
            len => self.state_at(len - 1),
        };
        let wanted = self.state_at(target);
        let unlink = current.difference(&wanted).cloned().collect();
        let link = wanted.difference(&current).cloned().collect();
        (unlink, link)
    }

    /// Extracts the [`UserRequest`]s recorded in the revision comments. A
    /// request is produced for every revision with a `# cmd:` comment.
    pub fn user_requests(&self) -> Vec<UserRequest> {
        let cmd_re = lazy_regex::regex!(r"^#\s*cmd:\s*(.+)$");
        let spec_re = lazy_regex::regex!(r"^#\s*(\w+)\s*specs:\s*(.+)?$");

        let mut requests = Vec::new();
        for rev in &self.revisions {
            let mut request = UserRequest {
                date: rev.timestamp.clone(),
                ..Default::default()
            };

            for comment in &rev.comments {
                if let Some(caps) = cmd_re.captures(comment) {
                    request.cmd = Some(caps[1].to_string());
                }
                if let Some(caps) = spec_re.captures(comment) {
                    let action = caps[1].to_string();
                    let specs = parse_specs_string(caps.get(2).map_or("", |m| m.as_str()));
                    match action.as_str() {
                        "install" | "create" | "update" => request.update_specs = specs,
                        "remove" | "uninstall" => request.remove_specs = specs,
                        _ => {}
                    }
                    request.action = Some(action);
                }
            }

            if request.cmd.is_some() {
                requests.push(request);
            }
        }
        requests
    }
}

/// Read and append access to the history file of a prefix.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    /// Creates a `History` pointing at `<prefix>/conda-meta/history`.
    pub fn new(prefix: impl AsRef<Path>) -> Self {
        Self {
            path: prefix.as_ref().join("conda-meta").join("history"),
        }
    }

    /// Creates a `History` from an explicit file path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the history file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the history file. A missing file parses as an empty history.
    pub fn parse(&self) -> Result<ParsedHistory, HistoryError> {
        if !self.path.exists() {
            return Ok(ParsedHistory {
                revisions: Vec::new(),
            });
        }
        let contents = fs_err::read_to_string(&self.path)?;
        Ok(Self::parse_str(&contents))
    }

    /// Parses a history file from a reader.
    pub fn from_reader(mut reader: impl Read) -> Result<ParsedHistory, HistoryError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Ok(Self::parse_str(&contents))
    }

    /// Parses the contents of a history file. Lines before the first header
    /// are ignored, matching conda's behavior.
    pub fn parse_str(s: &str) -> ParsedHistory {
        let header_re = lazy_regex::regex!(r"^==>\s*(.+?)\s*<==$");

        let mut revisions: Vec<HistoryRevision> = Vec::new();
        for line in s.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = header_re.captures(line) {
                revisions.push(HistoryRevision {
                    timestamp: caps[1].to_string(),
                    packages: BTreeSet::new(),
                    comments: Vec::new(),
                });
            } else if let Some(rev) = revisions.last_mut() {
                if line.starts_with('#') {
                    rev.comments.push(line.to_string());
                } else {
                    rev.packages.insert(line.to_string());
                }
            }
        }

        ParsedHistory { revisions }
    }

    /// Appends a revision block with its metadata comments. The file (and
    /// its parent directory) are created when missing.
    pub fn append_revision(
        &self,
        revision: &Revision,
        cmd: Option<&str>,
        action_specs: Option<(&str, &[String])>,
    ) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "==> {} <==", revision.timestamp)?;
        if let Some(cmd) = cmd {
            writeln!(file, "# cmd: {cmd}")?;
        }
        if let Some((action, specs)) = action_specs {
            writeln!(file, "# {action} specs: {specs:?}")?;
        }
        for pkg in &revision.removed {
            writeln!(file, "-{pkg}")?;
        }
        for pkg in &revision.added {
            writeln!(file, "+{pkg}")?;
        }

        Ok(())
    }
}

/// Parses the spec list out of a `# <action> specs: ...` comment. Both the
/// python-list format (`['numpy', 'pandas']`) and the older comma separated
/// format are understood.
fn parse_specs_string(s: &str) -> Vec<String> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }

    if s.starts_with('[') {
        return s
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(|spec| spec.trim().trim_matches('\'').trim_matches('"').to_string())
            .filter(|spec| !spec.is_empty())
            .collect();
    }

    // In the comma separated format a part that starts with a version
    // operator continues the previous spec.
    let mut specs: Vec<String> = Vec::new();
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.starts_with(['>', '<', '=', '!']) && !specs.is_empty() {
            let last = specs.last_mut().unwrap();
            *last = format!("{last},{part}");
        } else {
            specs.push(part.to_string());
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{History, Revision};

    const SAMPLE_HISTORY: &str = "\
==> 2024-01-15 10:30:00 <==
# cmd: create -n test python=3.12
# install specs: ['python=3.12']
+python-3.12.0-h1234567_0
+openssl-3.2.0-h8765432_0
+pip-24.0-pyhd8ed1ab_0

==> 2024-01-16 14:20:00 <==
# cmd: install numpy pandas
# update specs: ['numpy', 'pandas']
+numpy-1.26.3-py312h1234567_0
+pandas-2.1.5-py312h7654321_0

==> 2024-01-17 09:00:00 <==
# cmd: remove pip
# remove specs: ['pip']
-pip-24.0-pyhd8ed1ab_0
";

    #[test]
    fn parse_revisions() {
        let parsed = History::parse_str(SAMPLE_HISTORY);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.revisions[0].timestamp, "2024-01-15 10:30:00");
        assert_eq!(parsed.revisions[0].packages.len(), 3);
        assert_eq!(parsed.revisions[2].packages.len(), 1);
        assert!(parsed.revisions[2]
            .packages
            .contains("-pip-24.0-pyhd8ed1ab_0"));
        assert_eq!(parsed.latest().unwrap().timestamp, "2024-01-17 09:00:00");
    }

    #[test]
    fn parse_user_requests() {
        let parsed = History::parse_str(SAMPLE_HISTORY);
        let requests = parsed.user_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].action.as_deref(), Some("install"));
        assert_eq!(requests[0].update_specs, vec!["python=3.12"]);
        assert_eq!(requests[1].action.as_deref(), Some("update"));
        assert_eq!(requests[1].update_specs, vec!["numpy", "pandas"]);
        assert_eq!(requests[2].action.as_deref(), Some("remove"));
        assert_eq!(requests[2].remove_specs, vec!["pip"]);
    }

    #[test]
    fn state_accumulates() {
        let parsed = History::parse_str(SAMPLE_HISTORY);

        let rev0 = parsed.state_at(0);
        assert_eq!(rev0.len(), 3);
        assert!(rev0.contains("pip-24.0-pyhd8ed1ab_0"));

        let rev1 = parsed.state_at(1);
        assert_eq!(rev1.len(), 5);

        let rev2 = parsed.state_at(2);
        assert_eq!(rev2.len(), 4);
        assert!(!rev2.contains("pip-24.0-pyhd8ed1ab_0"));
    }

    #[test]
    fn revert_diff() {
        let parsed = History::parse_str(SAMPLE_HISTORY);
        let (unlink, link) = parsed.revert_diff(0);
        assert_eq!(
            unlink,
            BTreeSet::from([
                "numpy-1.26.3-py312h1234567_0".to_string(),
                "pandas-2.1.5-py312h7654321_0".to_string(),
            ])
        );
        assert_eq!(link, BTreeSet::from(["pip-24.0-pyhd8ed1ab_0".to_string()]));
    }

    #[test]
    fn ignores_lines_before_first_header() {
        let input = "garbage\n# comment\n==> 2024-01-01 00:00:00 <==\npkg-1.0-0\n";
        let parsed = History::parse_str(input);
        assert_eq!(parsed.len(), 1);
        assert!(parsed.revisions[0].comments.is_empty());
        assert_eq!(parsed.revisions[0].packages.len(), 1);
    }

    #[test]
    fn append_and_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());

        let specs = vec!["python=3.12".to_string()];
        history
            .append_revision(
                &Revision {
                    timestamp: "2024-01-15 10:30:00".to_string(),
                    removed: BTreeSet::new(),
                    added: BTreeSet::from(["python-3.12.0-h1234567_0".to_string()]),
                },
                Some("create python=3.12"),
                Some(("install", &specs)),
            )
            .unwrap();
        history
            .append_revision(
                &Revision {
                    timestamp: "2024-01-16 10:30:00".to_string(),
                    removed: BTreeSet::from(["python-3.12.0-h1234567_0".to_string()]),
                    added: BTreeSet::from(["python-3.13.0-h1234567_0".to_string()]),
                },
                Some("install python=3.13"),
                Some(("update", &specs)),
            )
            .unwrap();

        let parsed = history.parse().unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed.state_at(1),
            BTreeSet::from(["python-3.13.0-h1234567_0".to_string()])
        );
        let requests = parsed.user_requests();
        assert_eq!(requests[0].cmd.as_deref(), Some("create python=3.12"));
    }

    #[test]
    fn missing_file_parses_empty() {
        let history = History::from_path("/definitely/not/here/history");
        assert!(history.parse().unwrap().is_empty());
    }

    #[test]
    fn specs_old_comma_format() {
        let specs = super::parse_specs_string("param >=1.5.1,<2.0,python>=3.5");
        assert_eq!(specs, vec!["param >=1.5.1,<2.0", "python>=3.5"]);
    }
}
