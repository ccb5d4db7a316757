//! Trimming of the full index to the part reachable from the user's specs.
//!
//! SAT solving over a complete channel (tens of thousands of records) is not
//! tractable; solving over the transitive closure of the requested names is.
//! The reduction walks dependency names breadth-first starting from the
//! specs, pulling in every record of every visited name. Records of the
//! current prefix are injected as well so "keep what is installed" remains a
//! representable solution.

use std::collections::VecDeque;

use fxhash::{FxHashMap, FxHashSet};
use krait_conda_types::{MatchSpec, Matches, ParseStrictness, RepoDataRecord};

/// Computes the reduced record set for the given specs.
pub(crate) fn reduced_index<'a>(
    available: &'a [RepoDataRecord],
    installed: &'a [RepoDataRecord],
    specs: &[MatchSpec],
) -> Vec<&'a RepoDataRecord> {
    let mut by_name: FxHashMap<&str, Vec<&'a RepoDataRecord>> = FxHashMap::default();
    for record in available {
        by_name
            .entry(record.package_record.name.as_normalized())
            .or_default()
            .push(record);
    }

    let mut queue: VecDeque<String> = VecDeque::new();
    let mut visited: FxHashSet<String> = FxHashSet::default();
    let mut result: Vec<&'a RepoDataRecord> = Vec::new();
    let mut result_keys: FxHashSet<(String, String, String, String)> = FxHashSet::default();

    for spec in specs {
        if let Some(name) = &spec.name {
            if visited.insert(name.as_normalized().to_owned()) {
                queue.push_back(name.as_normalized().to_owned());
            }
        }
    }
    for record in installed {
        let name = record.package_record.name.as_normalized();
        if visited.insert(name.to_owned()) {
            queue.push_back(name.to_owned());
        }
    }

    while let Some(name) = queue.pop_front() {
        let Some(records) = by_name.get(name.as_str()) else {
            continue;
        };
        for &record in records {
            if !result_keys.insert(identity(record)) {
                continue;
            }
            result.push(record);

            // Visit every dependency name. Parse failures are diagnosed when
            // the pool is built; here a malformed dep simply contributes no
            // edge.
            for dep in &record.package_record.depends {
                let Ok(dep_spec) = MatchSpec::from_str(dep, ParseStrictness::Lenient) else {
                    continue;
                };
                if let Some(dep_name) = &dep_spec.name {
                    let dep_name = dep_name.as_normalized();
                    if visited.insert(dep_name.to_owned()) {
                        queue.push_back(dep_name.to_owned());
                    }
                }
            }

            // Track features pull in their synthetic records.
            for feature in record
                .package_record
                .track_features
                .iter()
                .chain(record.package_record.features.iter().flatten())
            {
                let feature_name = format!("@{feature}");
                if visited.insert(feature_name.clone()) {
                    queue.push_back(feature_name);
                }
            }
        }
    }

    // Installed records that vanished from the channels are still real: they
    // are injected so the solver can keep or remove them explicitly.
    for record in installed {
        if result_keys.insert(identity(record)) {
            result.push(record);
        }
    }

    result
}

fn identity(record: &RepoDataRecord) -> (String, String, String, String) {
    (
        record.package_record.subdir.clone(),
        record.package_record.name.as_normalized().to_owned(),
        record.package_record.version.to_string(),
        record.package_record.build.clone(),
    )
}

#[cfg(test)]
mod test {
    use super::reduced_index;
    use krait_conda_types::{MatchSpec, ParseStrictness};

    use crate::test_index::record;

    #[test]
    fn walks_dependency_closure() {
        let available = vec![
            record("flask", "0.10.1", "py27_0", 0, &["python 2.7*"]),
            record("python", "2.7.5", "0", 0, &["openssl"]),
            record("openssl", "1.0", "0", 0, &[]),
            record("unrelated", "1.0", "0", 0, &[]),
        ];
        let specs = vec![MatchSpec::from_str("flask", ParseStrictness::Lenient).unwrap()];

        let reduced = reduced_index(&available, &[], &specs);
        let names: Vec<&str> = reduced
            .iter()
            .map(|r| r.package_record.name.as_normalized())
            .collect();
        assert!(names.contains(&"flask"));
        assert!(names.contains(&"python"));
        assert!(names.contains(&"openssl"));
        assert!(!names.contains(&"unrelated"));
    }

    #[test]
    fn injects_installed_records() {
        let available = vec![record("flask", "0.10.1", "py27_0", 0, &[])];
        let installed = vec![record("retired", "1.0", "0", 0, &[])];
        let specs = vec![MatchSpec::from_str("flask", ParseStrictness::Lenient).unwrap()];

        let reduced = reduced_index(&available, &installed, &specs);
        assert!(reduced
            .iter()
            .any(|r| r.package_record.name.as_normalized() == "retired"));
    }
}
