//! Typed ids for the entities the solver reasons about.

/// The id of an interned package name.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NameId(pub u32);

/// The id of an interned match spec.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SpecId(pub u32);

/// The id of a candidate record in the pool.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SolvableId(pub u32);

/// The id of a boolean variable of the SAT problem.
///
/// The first `pool.solvables.len()` variables correspond one-to-one to
/// solvables; the variables after that are auxiliary indicators (one per
/// installed package name, true when the name stays installed).
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct VarId(pub u32);

impl From<SolvableId> for VarId {
    fn from(id: SolvableId) -> Self {
        VarId(id.0)
    }
}

impl NameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl SpecId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl SolvableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
