//! Explaining unsatisfiable solves.
//!
//! When the hard clauses have no model the solver reports a *minimal
//! unsatisfiable core*: a subset of the user's specs that is still
//! unsatisfiable, found by deletion (drop a spec, re-solve, keep it dropped
//! when the problem stays unsatisfiable). To point at the actual conflict
//! the core specs are then walked through the dependency graph looking for a
//! package name that two specs constrain incompatibly; the paths to that
//! name are rendered as `a → b → c` chains.

use std::fmt::{Display, Formatter};

use fxhash::{FxHashMap, FxHashSet};
use krait_conda_types::{MatchSpec, Matches, RepoDataRecord};

/// How deep the chain search walks into the dependency graph.
const MAX_CHAIN_DEPTH: usize = 6;
/// How many candidate records are considered per visited spec.
const CANDIDATES_PER_SPEC: usize = 4;

/// No record matched a spec at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagesNotFoundError {
    /// The specs that matched nothing.
    pub specs: Vec<String>,

    /// The channels that were consulted.
    pub channels: Vec<String>,
}

impl Display for PackagesNotFoundError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "the following packages are not available from the current channels:"
        )?;
        for spec in &self.specs {
            writeln!(f, "  - {spec}")?;
        }
        if !self.channels.is_empty() {
            writeln!(f, "channels that were searched:")?;
            for channel in &self.channels {
                writeln!(f, "  - {channel}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PackagesNotFoundError {}

/// The specs matched records, but no mutually consistent assignment exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiableError {
    /// A minimal subset of the requested specs that is unsatisfiable.
    pub specs: Vec<String>,

    /// Human readable dependency chains leading to the conflict.
    pub chains: Vec<String>,
}

impl Display for UnsatisfiableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "the following specifications were found to be incompatible:")?;
        for chain in &self.chains {
            writeln!(f, "  - {chain}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnsatisfiableError {}

/// One discovered path through the dependency graph.
#[derive(Debug, Clone)]
struct Path {
    root: usize,
    specs: Vec<String>,
    leaf: MatchSpec,
}

/// Builds conflict chains for the given core specs over the reduced record
/// set. Falls back to rendering the bare specs when no conflicting name is
/// found within the search limits.
pub(crate) fn build_chains(
    core_specs: &[(usize, MatchSpec)],
    records: &[&RepoDataRecord],
) -> Vec<String> {
    let mut by_name: FxHashMap<&str, Vec<&RepoDataRecord>> = FxHashMap::default();
    for &record in records {
        by_name
            .entry(record.package_record.name.as_normalized())
            .or_default()
            .push(record);
    }

    // Walk the dependency graph from every core spec, remembering the first
    // path that reaches each package name.
    let mut paths_per_name: FxHashMap<String, Vec<Path>> = FxHashMap::default();
    for (root, spec) in core_specs {
        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut frontier = vec![Path {
            root: *root,
            specs: vec![spec.to_string()],
            leaf: spec.clone(),
        }];

        for _ in 0..MAX_CHAIN_DEPTH {
            let mut next = Vec::new();
            for path in frontier {
                let Some(name) = path.leaf.name.as_ref() else {
                    continue;
                };
                let name = name.as_normalized().to_owned();
                paths_per_name.entry(name.clone()).or_default().push(path.clone());
                if !visited.insert(name.clone()) {
                    continue;
                }

                let candidates = by_name
                    .get(name.as_str())
                    .map(|records| {
                        records
                            .iter()
                            .filter(|r| path.leaf.matches(**r))
                            .take(CANDIDATES_PER_SPEC)
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();

                for record in candidates {
                    for dep in &record.package_record.depends {
                        let Ok(dep_spec) = MatchSpec::from_str(
                            dep,
                            krait_conda_types::ParseStrictness::Lenient,
                        ) else {
                            continue;
                        };
                        let mut specs = path.specs.clone();
                        specs.push(dep.clone());
                        next.push(Path {
                            root: path.root,
                            specs,
                            leaf: dep_spec,
                        });
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
    }

    // A name constrained by two different roots whose requirements no record
    // can satisfy simultaneously is the conflict we report.
    let mut chains = Vec::new();
    let mut names: Vec<&String> = paths_per_name.keys().collect();
    names.sort();
    'outer: for name in names {
        let paths = &paths_per_name[name];
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                if a.root == b.root {
                    continue;
                }
                let records = by_name.get(name.as_str());
                let compatible = records.is_some_and(|records| {
                    records
                        .iter()
                        .any(|r| a.leaf.matches(*r) && b.leaf.matches(*r))
                });
                if !compatible {
                    chains.push(a.specs.join(" → "));
                    chains.push(b.specs.join(" → "));
                    break 'outer;
                }
            }
        }
    }

    if chains.is_empty() {
        chains = core_specs
            .iter()
            .map(|(_, spec)| spec.to_string())
            .collect();
    }
    chains
}
