//! The pool interns the names, match specs and candidate records of one
//! solve, and caches the sorted candidate list of every spec.

use std::cell::OnceCell;
use std::cmp::Ordering;

use fxhash::FxHashMap;
use krait_conda_types::{MatchSpec, Matches, ParseStrictness, RepoDataRecord};

use crate::id::{NameId, SolvableId, SpecId};
use crate::SolveError;

/// A candidate record of the solve.
pub(crate) struct Solvable<'a> {
    /// The record this solvable stands for.
    pub record: &'a RepoDataRecord,

    /// The interned name of the record.
    pub name: NameId,

    /// The interned dependency specs of the record.
    pub dependencies: Vec<SpecId>,

    /// The interned constrains specs of the record.
    pub constrains: Vec<SpecId>,
}

/// Interned data of a single solve.
#[derive(Default)]
pub(crate) struct Pool<'a> {
    /// All candidate records.
    pub solvables: Vec<Solvable<'a>>,

    /// Interned package names.
    pub names: Vec<String>,
    names_to_ids: FxHashMap<String, NameId>,

    /// The solvables carrying each name.
    pub packages_by_name: Vec<Vec<SolvableId>>,

    /// Interned match specs.
    pub specs: Vec<MatchSpec>,
    specs_to_ids: FxHashMap<String, SpecId>,

    /// Cached candidates per spec, sorted in preference order.
    candidates: Vec<OnceCell<Vec<SolvableId>>>,
}

impl<'a> Pool<'a> {
    /// Builds a pool from a reduced set of records. Dependency and constrain
    /// strings are parsed once here.
    pub fn from_records(records: &[&'a RepoDataRecord]) -> Result<Self, SolveError> {
        let mut pool = Pool::default();
        for &record in records {
            pool.add_record(record)?;
        }
        Ok(pool)
    }

    fn add_record(&mut self, record: &'a RepoDataRecord) -> Result<SolvableId, SolveError> {
        let name = self.intern_name(record.package_record.name.as_normalized());

        let dependencies = record
            .package_record
            .depends
            .iter()
            .map(|dep| self.intern_spec(dep))
            .collect::<Result<Vec<_>, _>>()?;
        let constrains = record
            .package_record
            .constrains
            .iter()
            .map(|dep| self.intern_spec(dep))
            .collect::<Result<Vec<_>, _>>()?;

        let id = SolvableId(self.solvables.len() as u32);
        self.solvables.push(Solvable {
            record,
            name,
            dependencies,
            constrains,
        });
        self.packages_by_name[name.index()].push(id);
        Ok(id)
    }

    /// Interns a package name.
    pub fn intern_name(&mut self, name: &str) -> NameId {
        match self.names_to_ids.get(name) {
            Some(&id) => id,
            None => {
                let id = NameId(self.names.len() as u32);
                self.names.push(name.to_owned());
                self.packages_by_name.push(Vec::new());
                self.names_to_ids.insert(name.to_owned(), id);
                id
            }
        }
    }

    /// Returns the id of an already interned name.
    pub fn lookup_name(&self, name: &str) -> Option<NameId> {
        self.names_to_ids.get(name).copied()
    }

    /// Interns a match spec string.
    pub fn intern_spec(&mut self, spec: &str) -> Result<SpecId, SolveError> {
        if let Some(&id) = self.specs_to_ids.get(spec) {
            return Ok(id);
        }
        let parsed = MatchSpec::from_str(spec, ParseStrictness::Lenient)
            .map_err(|e| SolveError::InvalidMatchSpec(spec.to_owned(), e))?;
        let id = SpecId(self.specs.len() as u32);
        self.specs.push(parsed);
        self.candidates.push(OnceCell::new());
        self.specs_to_ids.insert(spec.to_owned(), id);
        Ok(id)
    }

    /// Interns an already parsed match spec.
    pub fn intern_parsed_spec(&mut self, spec: MatchSpec) -> SpecId {
        let key = spec.to_string();
        if let Some(&id) = self.specs_to_ids.get(&key) {
            return id;
        }
        let id = SpecId(self.specs.len() as u32);
        self.specs.push(spec);
        self.candidates.push(OnceCell::new());
        self.specs_to_ids.insert(key, id);
        id
    }

    /// Returns the spec for an id.
    pub fn spec(&self, id: SpecId) -> &MatchSpec {
        &self.specs[id.index()]
    }

    /// Returns the solvable for an id.
    pub fn solvable(&self, id: SolvableId) -> &Solvable<'a> {
        &self.solvables[id.index()]
    }

    /// Returns the candidates of a spec, sorted in the order the solver
    /// should try them: records without track features first, then by
    /// descending version, build number and timestamp.
    pub fn sorted_candidates(&self, spec_id: SpecId) -> &[SolvableId] {
        self.candidates[spec_id.index()].get_or_init(|| {
            let spec = &self.specs[spec_id.index()];
            let Some(name) = spec
                .name
                .as_ref()
                .and_then(|name| self.lookup_name(name.as_normalized()))
            else {
                return Vec::new();
            };

            let mut candidates: Vec<SolvableId> = self.packages_by_name[name.index()]
                .iter()
                .copied()
                .filter(|&id| spec.matches(self.solvables[id.index()].record))
                .collect();
            candidates.sort_by(|&a, &b| self.compare_candidates(a, b));
            candidates
        })
    }

    /// The conda candidate preference order.
    pub fn compare_candidates(&self, a: SolvableId, b: SolvableId) -> Ordering {
        let a_record = &self.solvables[a.index()].record.package_record;
        let b_record = &self.solvables[b.index()].record.package_record;

        // Records with track features sort behind those without.
        let a_tracked = !a_record.track_features.is_empty();
        let b_tracked = !b_record.track_features.is_empty();
        a_tracked
            .cmp(&b_tracked)
            .then_with(|| b_record.version.cmp(&a_record.version))
            .then_with(|| b_record.build_number.cmp(&a_record.build_number))
            .then_with(|| b_record.timestamp.cmp(&a_record.timestamp))
            .then_with(|| a_record.build.cmp(&b_record.build))
            .then_with(|| a.0.cmp(&b.0))
    }

    /// All solvables of a name, in preference order.
    pub fn sorted_solvables_of_name(&self, name: NameId) -> Vec<SolvableId> {
        let mut ids = self.packages_by_name[name.index()].clone();
        ids.sort_by(|&a, &b| self.compare_candidates(a, b));
        ids
    }
}
