//! The boolean clauses of the solve.
//!
//! Every candidate record (and every auxiliary indicator) is one boolean
//! variable; `true` means "part of the solution". Clauses are disjunctions
//! of literals, materialized as plain vectors. The kind is kept alongside so
//! unsatisfiable problems can be explained in terms of the construct that
//! produced a clause.

use crate::id::{NameId, SolvableId, SpecId, VarId};

/// A literal: a variable or its negation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) struct Literal {
    /// The variable.
    pub var: VarId,
    /// Whether the variable appears negated.
    pub negate: bool,
}

impl Literal {
    /// A positive literal.
    pub fn pos(var: impl Into<VarId>) -> Self {
        Literal {
            var: var.into(),
            negate: false,
        }
    }

    /// A negative literal.
    pub fn neg(var: impl Into<VarId>) -> Self {
        Literal {
            var: var.into(),
            negate: true,
        }
    }

    /// The value that makes this literal evaluate to true.
    pub fn satisfying_value(self) -> bool {
        !self.negate
    }

    /// Evaluates the literal under a (partial) assignment.
    pub fn eval(self, value: Option<bool>) -> Option<bool> {
        value.map(|v| if self.negate { !v } else { v })
    }

    /// The index of this literal in watch lists.
    pub fn watch_index(self) -> usize {
        self.var.index() * 2 + usize::from(self.negate)
    }
}

/// Why a clause exists. Used for diagnostics only; the solver itself treats
/// all clauses alike.
#[derive(Debug, Clone)]
pub(crate) enum ClauseKind {
    /// A non-optional user spec must be satisfied by one of its candidates.
    /// Carries the position of the spec in the task so the unsatisfiable
    /// core can be reported in the user's terms.
    Root {
        /// Index of the spec in the task's spec list.
        spec_index: usize,
    },

    /// A chosen record requires one of the candidates of a dependency.
    Requires {
        /// The solvable whose dependency this is.
        solvable: SolvableId,
        /// The dependency spec.
        spec: SpecId,
    },

    /// At most one record per package name.
    ForbidMultiple {
        /// The interned name.
        name: NameId,
    },

    /// A chosen record forbids records that violate one of its constrains.
    Constrains {
        /// The solvable carrying the constrains.
        solvable: SolvableId,
        /// The constrains spec.
        spec: SpecId,
    },

    /// The record may never be installed (disallowed package, or a record
    /// excluded by an optional spec).
    Forbid,

    /// Installing a record activates or consumes a feature.
    Feature,

    /// Links a keep-indicator variable to the records of its name.
    Keep,
}

/// A single clause: the disjunction of its literals.
#[derive(Debug, Clone)]
pub(crate) struct Clause {
    /// The literals, in decision preference order.
    pub literals: Vec<Literal>,
    /// Why the clause exists.
    pub kind: ClauseKind,
}

impl Clause {
    pub fn new(literals: Vec<Literal>, kind: ClauseKind) -> Self {
        Self { literals, kind }
    }
}
