#![deny(missing_docs)]

//! The dependency solver: given a package index and a set of user specs,
//! select a mutually consistent set of records.
//!
//! The solve is encoded as boolean satisfiability — one variable per
//! candidate record — and handed to a DPLL solver. On top of the hard
//! clauses a sequence of lexicographically ordered objectives is minimized,
//! each by binary-searching a pseudo-boolean upper bound:
//!
//! 1. records of names the user asked to remove,
//! 2. channel priority violations (a hard index filter under strict
//!    priority),
//! 3. active track features,
//! 4. version, build-number and timestamp recency ranks,
//! 5. packages removed relative to the current prefix,
//! 6. packages changed relative to the current prefix.

mod clause;
mod id;
mod pool;
mod problem;
mod reduce;
mod solver;

#[cfg(test)]
pub(crate) mod test_index;

use fxhash::{FxHashMap, FxHashSet};
use krait_conda_types::{MatchSpec, Matches, PackageName, ParseMatchSpecError, RepoDataRecord};

use clause::{Clause, ClauseKind, Literal};
use id::{NameId, SolvableId, VarId};
use pool::Pool;
use solver::{Objective, SatSolver};

pub use problem::{PackagesNotFoundError, UnsatisfiableError};

/// How channel order influences the solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPriority {
    /// Records from lower priority channels are removed from the index
    /// before solving whenever a higher priority channel carries the name.
    Strict,
    /// Channel priority is an objective: it outranks version recency but can
    /// be violated when necessary.
    #[default]
    Flexible,
    /// Channel order is ignored.
    Disabled,
}

/// Everything a solve needs.
#[derive(Debug, Clone, Default)]
pub struct SolverTask {
    /// All available records, including the synthetic `@feature` records.
    pub available: Vec<RepoDataRecord>,

    /// Canonical channel names in priority order (highest first).
    pub channel_order: Vec<String>,

    /// The records currently installed in the prefix.
    pub installed: Vec<RepoDataRecord>,

    /// The specs the solution must satisfy.
    pub specs: Vec<MatchSpec>,

    /// Specs naming packages the user asked to remove.
    pub specs_to_remove: Vec<MatchSpec>,

    /// Names that may never appear in a solution.
    pub disallowed: Vec<PackageName>,

    /// How channel order is enforced.
    pub channel_priority: ChannelPriority,

    /// When set, dependencies of requested packages are free to change; the
    /// "changed packages" objective is skipped.
    pub update_deps: bool,
}

/// An error produced by [`solve`].
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    /// A spec matched no record at all.
    #[error(transparent)]
    PackagesNotFound(#[from] PackagesNotFoundError),

    /// The specs matched records but no consistent assignment exists.
    #[error(transparent)]
    Unsatisfiable(#[from] UnsatisfiableError),

    /// A dependency string in the index could not be parsed.
    #[error("failed to parse match spec '{0}'")]
    InvalidMatchSpec(String, #[source] ParseMatchSpecError),
}

/// Solves the task, returning the selected records sorted by name.
pub fn solve(task: &SolverTask) -> Result<Vec<RepoDataRecord>, SolveError> {
    // Trim the index to the names reachable from the specs; under strict
    // channel priority additionally drop shadowed channels per name.
    let mut reduced = reduce::reduced_index(&task.available, &task.installed, &task.specs);
    if task.channel_priority == ChannelPriority::Strict {
        reduced = filter_strict_channel_priority(reduced, &task.channel_order);
    }
    tracing::debug!(
        "solving {} specs over a reduced index of {} records",
        task.specs.len(),
        reduced.len()
    );

    let mut pool = Pool::from_records(&reduced)?;

    let root_spec_ids: Vec<_> = task
        .specs
        .iter()
        .map(|spec| pool.intern_parsed_spec(spec.clone()))
        .collect();

    // A non-optional spec without any candidate can never be satisfied;
    // collect all of them so the user sees the full list at once.
    let not_found: Vec<String> = task
        .specs
        .iter()
        .zip(&root_spec_ids)
        .filter(|(spec, &sid)| !spec.optional && pool.sorted_candidates(sid).is_empty())
        .map(|(spec, _)| spec.to_string())
        .collect();
    if !not_found.is_empty() {
        return Err(PackagesNotFoundError {
            specs: not_found,
            channels: task.channel_order.clone(),
        }
        .into());
    }

    let num_solvables = pool.solvables.len();

    // One auxiliary "keep" variable per installed name: true iff some record
    // of the name is part of the solution.
    let mut keep_vars: Vec<(NameId, VarId, &RepoDataRecord)> = Vec::new();
    let mut seen_names: FxHashSet<NameId> = FxHashSet::default();
    let mut next_var = num_solvables as u32;
    for installed in &task.installed {
        if let Some(name) = pool.lookup_name(installed.package_record.name.as_normalized()) {
            if seen_names.insert(name) {
                keep_vars.push((name, VarId(next_var), installed));
                next_var += 1;
            }
        }
    }
    let num_vars = next_var as usize;

    let clauses = build_clauses(&pool, task, &root_spec_ids, &keep_vars);
    let objectives = build_objectives(&pool, task, &keep_vars);

    // Hard clauses first; if they cannot be satisfied the problem is
    // explained in terms of a minimal spec core.
    let Some(mut best) = SatSolver::new(&clauses, num_vars, &[], |_| false).solve() else {
        return Err(analyze_unsat(&clauses, num_vars, task, &reduced).into());
    };

    // Minimize the objectives lexicographically: each objective is bounded
    // by binary search while all earlier objectives stay frozen at their
    // optimum.
    let mut bounds: Vec<(&Objective, u64)> = Vec::new();
    for objective in &objectives {
        if objective.is_empty() {
            continue;
        }
        let mut hi = objective.eval(&best);
        let mut lo = 0u64;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mut trial = bounds.clone();
            trial.push((objective, mid));
            match SatSolver::new(&clauses, num_vars, &trial, |_| false).solve() {
                Some(solution) => {
                    hi = objective.eval(&solution);
                    best = solution;
                }
                None => lo = mid + 1,
            }
        }
        bounds.push((objective, hi));
    }

    // Collect the chosen records; the synthetic feature records are solver
    // internals and never installed.
    let mut result: Vec<RepoDataRecord> = (0..num_solvables)
        .filter(|&idx| best[idx])
        .map(|idx| pool.solvable(SolvableId(idx as u32)).record)
        .filter(|record| !record.package_record.name.as_normalized().starts_with('@'))
        .cloned()
        .collect();
    result.sort_by(|a, b| {
        a.package_record
            .name
            .as_normalized()
            .cmp(b.package_record.name.as_normalized())
            .then_with(|| a.package_record.version.cmp(&b.package_record.version))
    });
    Ok(result)
}

/// Drops records that live in a lower priority channel than the best channel
/// carrying their name. Records without a channel (the synthetic feature
/// records) are never dropped.
fn filter_strict_channel_priority<'a>(
    records: Vec<&'a RepoDataRecord>,
    channel_order: &[String],
) -> Vec<&'a RepoDataRecord> {
    let rank = |record: &RepoDataRecord| {
        channel_order
            .iter()
            .position(|c| c == &record.channel)
            .unwrap_or(channel_order.len())
    };

    let mut best_rank: FxHashMap<&str, usize> = FxHashMap::default();
    for record in &records {
        if record.channel.is_empty() {
            continue;
        }
        let name = record.package_record.name.as_normalized();
        let rank = rank(record);
        best_rank
            .entry(name)
            .and_modify(|best| *best = (*best).min(rank))
            .or_insert(rank);
    }

    records
        .into_iter()
        .filter(|record| {
            record.channel.is_empty()
                || best_rank
                    .get(record.package_record.name.as_normalized())
                    .map_or(true, |&best| rank(record) <= best)
        })
        .collect()
}

fn build_clauses(
    pool: &Pool<'_>,
    task: &SolverTask,
    root_spec_ids: &[id::SpecId],
    keep_vars: &[(NameId, VarId, &RepoDataRecord)],
) -> Vec<Clause> {
    let mut clauses = Vec::new();

    // Spec satisfaction. The clause order matters: the solver decides in
    // clause order, so the user's specs drive the search.
    for (spec_index, (spec, &sid)) in task.specs.iter().zip(root_spec_ids).enumerate() {
        if spec.optional {
            // An optional spec never forces installation, but forbids any
            // record of the name that violates it.
            if let Some(name) = spec
                .name
                .as_ref()
                .and_then(|n| pool.lookup_name(n.as_normalized()))
            {
                for &candidate in &pool.packages_by_name[name.index()] {
                    if !spec.matches(pool.solvable(candidate).record) {
                        clauses.push(Clause::new(
                            vec![Literal::neg(candidate)],
                            ClauseKind::Forbid,
                        ));
                    }
                }
            }
        } else {
            let literals = pool
                .sorted_candidates(sid)
                .iter()
                .map(|&c| Literal::pos(c))
                .collect();
            clauses.push(Clause::new(literals, ClauseKind::Root { spec_index }));
        }
    }

    // Dependencies and feature activation per candidate.
    for idx in 0..pool.solvables.len() {
        let solvable_id = SolvableId(idx as u32);
        let dependencies = pool.solvable(solvable_id).dependencies.clone();
        for dep in dependencies {
            let mut literals = vec![Literal::neg(solvable_id)];
            literals.extend(pool.sorted_candidates(dep).iter().map(|&c| Literal::pos(c)));
            clauses.push(Clause::new(
                literals,
                ClauseKind::Requires {
                    solvable: solvable_id,
                    spec: dep,
                },
            ));
        }

        let record = &pool.solvable(solvable_id).record.package_record;
        let own_name = record.name.as_normalized().to_owned();
        let features: Vec<String> = record
            .track_features
            .iter()
            .chain(record.features.iter().flatten())
            .cloned()
            .collect();
        for feature in features {
            let feature_name = format!("@{feature}");
            if own_name == feature_name {
                continue;
            }
            if let Some(name) = pool.lookup_name(&feature_name) {
                let mut literals = vec![Literal::neg(solvable_id)];
                literals.extend(
                    pool.packages_by_name[name.index()]
                        .iter()
                        .map(|&c| Literal::pos(c)),
                );
                clauses.push(Clause::new(literals, ClauseKind::Feature));
            }
        }
    }

    // Keep indicators: k_n <-> any record of name n installed. The positive
    // direction keeps the prefix stable by default, the negative direction
    // is what the stability objective measures.
    for (name, keep, _) in keep_vars {
        for &member in &pool.packages_by_name[name.index()] {
            clauses.push(Clause::new(
                vec![Literal::pos(*keep), Literal::neg(member)],
                ClauseKind::Keep,
            ));
        }
        let mut literals = vec![Literal::neg(*keep)];
        literals.extend(
            pool.sorted_solvables_of_name(*name)
                .iter()
                .map(|&c| Literal::pos(c)),
        );
        clauses.push(Clause::new(literals, ClauseKind::Keep));
    }

    // Disallowed packages can never be chosen.
    for name in &task.disallowed {
        if let Some(name) = pool.lookup_name(name.as_normalized()) {
            for &member in &pool.packages_by_name[name.index()] {
                clauses.push(Clause::new(vec![Literal::neg(member)], ClauseKind::Forbid));
            }
        }
    }

    // At most one record per name.
    for name_idx in 0..pool.names.len() {
        let members = &pool.packages_by_name[name_idx];
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                clauses.push(Clause::new(
                    vec![Literal::neg(a), Literal::neg(b)],
                    ClauseKind::ForbidMultiple {
                        name: NameId(name_idx as u32),
                    },
                ));
            }
        }
    }

    // Constrains: a chosen record forbids records that violate its runtime
    // constraints.
    for idx in 0..pool.solvables.len() {
        let solvable_id = SolvableId(idx as u32);
        let constrains = pool.solvable(solvable_id).constrains.clone();
        for constrain in constrains {
            let spec = pool.spec(constrain).clone();
            let Some(name) = spec
                .name
                .as_ref()
                .and_then(|n| pool.lookup_name(n.as_normalized()))
            else {
                continue;
            };
            for &offender in &pool.packages_by_name[name.index()] {
                if offender != solvable_id && !spec.matches(pool.solvable(offender).record) {
                    clauses.push(Clause::new(
                        vec![Literal::neg(solvable_id), Literal::neg(offender)],
                        ClauseKind::Constrains {
                            solvable: solvable_id,
                            spec: constrain,
                        },
                    ));
                }
            }
        }
    }

    clauses
}

fn build_objectives(
    pool: &Pool<'_>,
    task: &SolverTask,
    keep_vars: &[(NameId, VarId, &RepoDataRecord)],
) -> Vec<Objective> {
    let mut objectives = Vec::new();

    // 1. Records of names requested for removal.
    let remove_names: FxHashSet<&str> = task
        .specs_to_remove
        .iter()
        .filter_map(|spec| spec.name.as_ref())
        .map(PackageName::as_normalized)
        .collect();
    let mut removal = Objective::default();
    for (idx, solvable) in pool.solvables.iter().enumerate() {
        if remove_names.contains(solvable.record.package_record.name.as_normalized()) {
            removal
                .weights
                .push((Literal::pos(SolvableId(idx as u32)), 1));
        }
    }
    objectives.push(removal);

    // 2. Channel priority, soft unless strict (strict already filtered the
    // index) or disabled.
    if task.channel_priority == ChannelPriority::Flexible {
        let mut channel = Objective::default();
        for (idx, solvable) in pool.solvables.iter().enumerate() {
            if solvable.record.channel.is_empty() {
                continue;
            }
            let rank = task
                .channel_order
                .iter()
                .position(|c| c == &solvable.record.channel)
                .unwrap_or(task.channel_order.len()) as u64;
            if rank > 0 {
                channel
                    .weights
                    .push((Literal::pos(SolvableId(idx as u32)), rank));
            }
        }
        objectives.push(channel);
    }

    // 3. Active track features, measured through the synthetic records.
    let mut features = Objective::default();
    for (idx, solvable) in pool.solvables.iter().enumerate() {
        if solvable
            .record
            .package_record
            .name
            .as_normalized()
            .starts_with('@')
        {
            features
                .weights
                .push((Literal::pos(SolvableId(idx as u32)), 1));
        }
    }
    objectives.push(features);

    // 4. Recency: per name, rank versions (newest = 0), then build numbers
    // within a version, then timestamps within a build number.
    let mut version_rank = Objective::default();
    let mut build_rank = Objective::default();
    let mut timestamp_rank = Objective::default();
    for name_idx in 0..pool.names.len() {
        let members = &pool.packages_by_name[name_idx];

        let mut versions: Vec<_> = members
            .iter()
            .map(|&m| &pool.solvable(m).record.package_record.version)
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();

        for &member in members {
            let record = &pool.solvable(member).record.package_record;
            let v_rank = versions
                .iter()
                .position(|v| *v == &record.version)
                .expect("own version is always present") as u64;
            if v_rank > 0 {
                version_rank.weights.push((Literal::pos(member), v_rank));
            }

            let mut build_numbers: Vec<u64> = members
                .iter()
                .map(|&m| &pool.solvable(m).record.package_record)
                .filter(|r| r.version == record.version)
                .map(|r| r.build_number)
                .collect();
            build_numbers.sort_unstable_by(|a, b| b.cmp(a));
            build_numbers.dedup();
            let b_rank = build_numbers
                .iter()
                .position(|&b| b == record.build_number)
                .expect("own build number is always present")
                as u64;
            if b_rank > 0 {
                build_rank.weights.push((Literal::pos(member), b_rank));
            }

            let mut timestamps: Vec<_> = members
                .iter()
                .map(|&m| &pool.solvable(m).record.package_record)
                .filter(|r| {
                    r.version == record.version && r.build_number == record.build_number
                })
                .map(|r| r.timestamp)
                .collect();
            timestamps.sort_unstable_by(|a, b| b.cmp(a));
            timestamps.dedup();
            let t_rank = timestamps
                .iter()
                .position(|&t| t == record.timestamp)
                .expect("own timestamp is always present") as u64;
            if t_rank > 0 {
                timestamp_rank.weights.push((Literal::pos(member), t_rank));
            }
        }
    }
    objectives.push(version_rank);
    objectives.push(build_rank);
    objectives.push(timestamp_rank);

    // 5. Stability: a missing keep indicator is a package removed from the
    // prefix.
    let mut stability = Objective::default();
    for (_, keep, _) in keep_vars {
        stability.weights.push((Literal::neg(*keep), 1));
    }
    objectives.push(stability);

    // 6. Changed packages relative to the prefix.
    if !task.update_deps {
        let mut changed = Objective::default();
        for (name, _, installed) in keep_vars {
            for &member in &pool.packages_by_name[name.index()] {
                let record = &pool.solvable(member).record.package_record;
                let installed_record = &installed.package_record;
                let same = record.version == installed_record.version
                    && record.build == installed_record.build
                    && record.subdir == installed_record.subdir;
                if !same {
                    changed.weights.push((Literal::pos(member), 1));
                }
            }
        }
        objectives.push(changed);
    }

    objectives
}

/// Explains an unsatisfiable problem: extracts a minimal spec core by
/// deletion and renders dependency chains for it.
fn analyze_unsat(
    clauses: &[Clause],
    num_vars: usize,
    task: &SolverTask,
    reduced: &[&RepoDataRecord],
) -> UnsatisfiableError {
    let mut removed: FxHashSet<usize> = FxHashSet::default();

    for index in 0..task.specs.len() {
        if task.specs[index].optional {
            continue;
        }
        let mut trial = removed.clone();
        trial.insert(index);
        let disabled = |clause_idx: usize| {
            matches!(
                clauses[clause_idx].kind,
                ClauseKind::Root { spec_index } if trial.contains(&spec_index)
            )
        };
        if SatSolver::new(clauses, num_vars, &[], disabled).solve().is_none() {
            // Still unsatisfiable without the spec, so it is not part of the
            // conflict.
            removed.insert(index);
        }
    }

    let core: Vec<(usize, MatchSpec)> = task
        .specs
        .iter()
        .enumerate()
        .filter(|(index, spec)| !spec.optional && !removed.contains(index))
        .map(|(index, spec)| (index, spec.clone()))
        .collect();

    let chains = problem::build_chains(&core, reduced);
    UnsatisfiableError {
        specs: core.iter().map(|(_, spec)| spec.to_string()).collect(),
        chains,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use krait_conda_types::{MatchSpec, PackageName, ParseStrictness};

    use super::{solve, ChannelPriority, SolveError, SolverTask};
    use crate::test_index::{feature_record, record, record_in_channel, record_with_features};

    fn spec(s: &str) -> MatchSpec {
        MatchSpec::from_str(s, ParseStrictness::Lenient).unwrap()
    }

    fn names(result: &[krait_conda_types::RepoDataRecord]) -> Vec<String> {
        result
            .iter()
            .map(|r| {
                format!(
                    "{}-{}-{}",
                    r.package_record.name.as_normalized(),
                    r.package_record.version,
                    r.package_record.build
                )
            })
            .collect()
    }

    #[test]
    fn simple_install() {
        let task = SolverTask {
            available: vec![
                record("python", "2.7.5", "0", 0, &[]),
                record("flask", "0.10.1", "py27_0", 0, &["python 2.7*"]),
            ],
            specs: vec![spec("python=2.7"), spec("flask=0.10.1")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(
            names(&result),
            vec!["flask-0.10.1-py27_0", "python-2.7.5-0"]
        );
    }

    #[test]
    fn remove_keeps_the_rest() {
        let python = record("python", "2.7.5", "0", 0, &[]);
        let flask = record("flask", "0.10.1", "py27_0", 0, &["python 2.7*"]);
        let task = SolverTask {
            available: vec![python.clone(), flask.clone()],
            installed: vec![python, flask],
            specs_to_remove: vec![spec("flask")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["python-2.7.5-0"]);
    }

    #[test]
    fn prefers_newest_version() {
        let task = SolverTask {
            available: vec![
                record("foo", "1.0", "0", 0, &[]),
                record("foo", "2.0", "0", 0, &[]),
                record("foo", "2.0", "1", 1, &[]),
            ],
            specs: vec![spec("foo")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["foo-2.0-1"]);
    }

    #[test]
    fn picks_build_matching_dependency() {
        let task = SolverTask {
            available: vec![
                record("python", "2.7.5", "0", 0, &[]),
                record("python", "3.6.0", "0", 0, &[]),
                record("flask", "1.0", "py27_0", 0, &["python 2.7*"]),
                record("flask", "1.0", "py36_0", 0, &["python 3.6*"]),
            ],
            specs: vec![spec("python=3"), spec("flask")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(
            names(&result),
            vec!["flask-1.0-py36_0", "python-3.6.0-0"]
        );
    }

    #[test]
    fn track_features_are_penalized() {
        // The newer build activates a track feature; the solver prefers the
        // older build without it.
        let mut available = vec![
            record("foo", "1.0", "0", 0, &[]),
            record_with_features("foo", "2.0", "0", 0, &["mkl"]),
            feature_record("mkl"),
        ];
        available.rotate_left(1);
        let task = SolverTask {
            available,
            specs: vec![spec("foo")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["foo-1.0-0"]);
    }

    #[test]
    fn track_feature_records_never_surface() {
        let task = SolverTask {
            available: vec![
                record_with_features("foo", "2.0", "0", 0, &["mkl"]),
                feature_record("mkl"),
            ],
            specs: vec![spec("foo")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["foo-2.0-0"]);
    }

    #[test]
    fn strict_channel_priority_filters_lower_channels() {
        let task = SolverTask {
            available: vec![
                record_in_channel("flask", "1.0", "py27_0", 0, &[], "high"),
                record_in_channel("flask", "2.0", "py36_0", 0, &[], "low"),
            ],
            channel_order: vec!["high".to_owned(), "low".to_owned()],
            channel_priority: ChannelPriority::Strict,
            specs: vec![spec("flask")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["flask-1.0-py27_0"]);
    }

    #[test]
    fn flexible_channel_priority_beats_version() {
        let task = SolverTask {
            available: vec![
                record_in_channel("flask", "1.0", "py27_0", 0, &[], "high"),
                record_in_channel("flask", "2.0", "py36_0", 0, &[], "low"),
            ],
            channel_order: vec!["high".to_owned(), "low".to_owned()],
            channel_priority: ChannelPriority::Flexible,
            specs: vec![spec("flask")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["flask-1.0-py27_0"]);
    }

    #[test]
    fn strict_priority_with_unsatisfiable_spec() {
        // The only build satisfying `python=3` lives in the shadowed
        // channel, so strict priority makes the problem unsatisfiable.
        let task = SolverTask {
            available: vec![
                record_in_channel("python", "2.7.5", "0", 0, &[], "high"),
                record_in_channel("python", "3.6.0", "0", 0, &[], "low"),
            ],
            channel_order: vec!["high".to_owned(), "low".to_owned()],
            channel_priority: ChannelPriority::Strict,
            specs: vec![spec("python=3")],
            ..Default::default()
        };
        assert_matches!(solve(&task), Err(SolveError::PackagesNotFound(_)));
    }

    #[test]
    fn packages_not_found() {
        let task = SolverTask {
            available: vec![record("foo", "1.0", "0", 0, &[])],
            channel_order: vec!["conda-forge".to_owned()],
            specs: vec![spec("doesnotexist")],
            ..Default::default()
        };
        let err = solve(&task).unwrap_err();
        match err {
            SolveError::PackagesNotFound(e) => {
                assert_eq!(e.specs, vec!["doesnotexist".to_owned()]);
                assert_eq!(e.channels, vec!["conda-forge".to_owned()]);
            }
            other => panic!("expected PackagesNotFound, got {other:?}"),
        }
    }

    #[test]
    fn conflicting_specs_are_unsatisfiable() {
        let task = SolverTask {
            available: vec![
                record("python", "2.7.5", "0", 0, &[]),
                record("python", "3.6.0", "0", 0, &[]),
                record("a", "1.0", "0", 0, &["python 2.7*"]),
                record("b", "1.0", "0", 0, &["python 3.6*"]),
            ],
            specs: vec![spec("a"), spec("b")],
            ..Default::default()
        };
        let err = solve(&task).unwrap_err();
        match err {
            SolveError::Unsatisfiable(e) => {
                assert_eq!(e.specs, vec!["a".to_owned(), "b".to_owned()]);
                // The chains lead from the specs to the conflicting python
                // requirements.
                assert!(e.chains.iter().any(|c| c.contains("python")), "{e:?}");
                assert!(e.chains.iter().any(|c| c.contains('→')), "{e:?}");
            }
            other => panic!("expected Unsatisfiable, got {other:?}"),
        }
    }

    #[test]
    fn unsat_core_is_minimal() {
        // `c` is irrelevant to the conflict between `a` and `b`.
        let task = SolverTask {
            available: vec![
                record("python", "2.7.5", "0", 0, &[]),
                record("python", "3.6.0", "0", 0, &[]),
                record("a", "1.0", "0", 0, &["python 2.7*"]),
                record("b", "1.0", "0", 0, &["python 3.6*"]),
                record("c", "1.0", "0", 0, &[]),
            ],
            specs: vec![spec("c"), spec("a"), spec("b")],
            ..Default::default()
        };
        let err = solve(&task).unwrap_err();
        match err {
            SolveError::Unsatisfiable(e) => {
                assert_eq!(e.specs, vec!["a".to_owned(), "b".to_owned()]);
            }
            other => panic!("expected Unsatisfiable, got {other:?}"),
        }
    }

    #[test]
    fn disallowed_packages_are_excluded() {
        let task = SolverTask {
            available: vec![
                record("foo", "1.0", "0", 0, &["bar"]),
                record("bar", "1.0", "0", 0, &[]),
            ],
            specs: vec![spec("foo")],
            disallowed: vec![PackageName::new_unchecked("bar")],
            ..Default::default()
        };
        assert_matches!(solve(&task), Err(SolveError::Unsatisfiable(_)));
    }

    #[test]
    fn constrains_are_honored() {
        // foo constrains bar to <2.0: installing both limits bar to 1.0.
        let mut foo = record("foo", "1.0", "0", 0, &[]);
        foo.package_record.constrains = vec!["bar <2.0".to_owned()];
        let task = SolverTask {
            available: vec![
                foo,
                record("bar", "1.0", "0", 0, &[]),
                record("bar", "2.5", "0", 0, &[]),
            ],
            specs: vec![spec("foo"), spec("bar")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["bar-1.0-0", "foo-1.0-0"]);
    }

    #[test]
    fn constrains_do_not_force_installation() {
        let mut foo = record("foo", "1.0", "0", 0, &[]);
        foo.package_record.constrains = vec!["bar <2.0".to_owned()];
        let task = SolverTask {
            available: vec![foo, record("bar", "1.0", "0", 0, &[])],
            specs: vec![spec("foo")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(names(&result), vec!["foo-1.0-0"]);
    }

    #[test]
    fn dependencies_are_installed() {
        let task = SolverTask {
            available: vec![
                record("flask", "0.10.1", "py27_0", 0, &["python 2.7*", "jinja2"]),
                record("python", "2.7.5", "0", 0, &[]),
                record("jinja2", "2.7", "py27_0", 0, &["python 2.7*"]),
            ],
            specs: vec![spec("flask")],
            ..Default::default()
        };
        let result = solve(&task).unwrap();
        assert_eq!(
            names(&result),
            vec![
                "flask-0.10.1-py27_0",
                "jinja2-2.7-py27_0",
                "python-2.7.5-0"
            ]
        );
    }

    #[test]
    fn solution_is_deterministic() {
        let available = vec![
            record("python", "2.7.5", "0", 0, &[]),
            record("python", "3.6.0", "0", 0, &[]),
            record("flask", "1.0", "py27_0", 0, &["python 2.7*"]),
            record("flask", "1.0", "py36_0", 0, &["python 3.6*"]),
        ];
        let task = SolverTask {
            available,
            specs: vec![spec("flask")],
            ..Default::default()
        };
        let first = names(&solve(&task).unwrap());
        for _ in 0..5 {
            assert_eq!(names(&solve(&task).unwrap()), first);
        }
    }
}
