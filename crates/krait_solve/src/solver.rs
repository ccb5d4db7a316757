//! A DPLL SAT solver with two-watched-literal unit propagation and an
//! optional pseudo-boolean upper bound per objective.
//!
//! The solver is deliberately simple: chronological backtracking, no clause
//! learning, decisions taken in clause order with candidates tried in their
//! preference order. Determinism matters more here than raw speed; the
//! reduced index keeps problem sizes small, and optimality is enforced by
//! the pseudo-boolean bounds rather than by decision heuristics.

use crate::clause::{Clause, Literal};
use crate::id::VarId;

/// A weighted sum of literals that is minimized lexicographically.
#[derive(Debug, Clone, Default)]
pub(crate) struct Objective {
    /// (literal, weight) pairs. The objective value of an assignment is the
    /// sum of the weights of the literals that evaluate to true.
    pub weights: Vec<(Literal, u64)>,
}

impl Objective {
    /// Evaluates the objective under a complete assignment.
    pub fn eval(&self, values: &[bool]) -> u64 {
        self.weights
            .iter()
            .filter(|(lit, _)| lit.eval(Some(values[lit.var.index()])) == Some(true))
            .map(|(_, weight)| *weight)
            .sum()
    }

    /// Returns true when no weight is attached to any literal.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// The running state of one pseudo-boolean constraint
/// `sum(weights of true literals) <= limit`.
struct BoundState {
    /// Weight applied when the variable is assigned true.
    pos: Vec<u64>,
    /// Weight applied when the variable is assigned false.
    neg: Vec<u64>,
    /// The inclusive upper bound.
    limit: u64,
    /// The sum accumulated by the current partial assignment.
    current: u64,
}

impl BoundState {
    fn new(objective: &Objective, limit: u64, num_vars: usize) -> Self {
        let mut pos = vec![0; num_vars];
        let mut neg = vec![0; num_vars];
        for (lit, weight) in &objective.weights {
            if lit.negate {
                neg[lit.var.index()] += weight;
            } else {
                pos[lit.var.index()] += weight;
            }
        }
        Self {
            pos,
            neg,
            limit,
            current: 0,
        }
    }

    fn weight(&self, var: VarId, value: bool) -> u64 {
        if value {
            self.pos[var.index()]
        } else {
            self.neg[var.index()]
        }
    }
}

/// A decision and whether its complement has been tried.
struct DecisionFrame {
    var: VarId,
    value: bool,
    flipped: bool,
    trail_mark: usize,
}

/// One run of the DPLL search over a fixed clause set.
pub(crate) struct SatSolver<'c> {
    clauses: &'c [Clause],
    /// Clauses disabled for this run (used for unsat core extraction).
    enabled: Vec<bool>,
    num_vars: usize,

    values: Vec<Option<bool>>,
    trail: Vec<VarId>,
    qhead: usize,
    decisions: Vec<DecisionFrame>,

    /// watch lists per literal index; clauses listed here watch the literal
    /// and must be revisited when it becomes false.
    watches: Vec<Vec<u32>>,
    /// per clause, the positions (into its literal vector) being watched.
    clause_watches: Vec<[usize; 2]>,

    bounds: Vec<BoundState>,
}

impl<'c> SatSolver<'c> {
    pub fn new(
        clauses: &'c [Clause],
        num_vars: usize,
        bounds: &[(&Objective, u64)],
        disabled: impl Fn(usize) -> bool,
    ) -> Self {
        Self {
            enabled: (0..clauses.len()).map(|idx| !disabled(idx)).collect(),
            clauses,
            num_vars,
            values: vec![None; num_vars],
            trail: Vec::new(),
            qhead: 0,
            decisions: Vec::new(),
            watches: vec![Vec::new(); num_vars * 2],
            clause_watches: vec![[0, 0]; clauses.len()],
            bounds: bounds
                .iter()
                .map(|(objective, limit)| BoundState::new(objective, *limit, num_vars))
                .collect(),
        }
    }

    /// Runs the search. Returns the satisfying assignment, or `None` when
    /// the problem is unsatisfiable under the bounds.
    pub fn solve(mut self) -> Option<Vec<bool>> {
        // Set up watches and the initial unit assignments.
        let clauses = self.clauses;
        for (idx, clause) in clauses.iter().enumerate() {
            if !self.enabled[idx] {
                continue;
            }
            match clause.literals.len() {
                0 => return None,
                1 => {
                    let lit = clause.literals[0];
                    if !self.assign(lit.var, lit.satisfying_value()) {
                        return None;
                    }
                }
                _ => {
                    self.clause_watches[idx] = [0, 1];
                    self.watches[clause.literals[0].watch_index()].push(idx as u32);
                    self.watches[clause.literals[1].watch_index()].push(idx as u32);
                }
            }
        }

        loop {
            if !self.propagate() {
                if !self.backtrack() {
                    return None;
                }
                continue;
            }

            match self.decide() {
                Some((var, value)) => {
                    self.decisions.push(DecisionFrame {
                        var,
                        value,
                        flipped: false,
                        trail_mark: self.trail.len(),
                    });
                    if !self.assign(var, value) && !self.backtrack() {
                        return None;
                    }
                }
                None => {
                    return Some(
                        self.values
                            .iter()
                            .map(|v| v.unwrap_or(false))
                            .collect(),
                    );
                }
            }
        }
    }

    fn value(&self, var: VarId) -> Option<bool> {
        self.values[var.index()]
    }

    fn eval(&self, lit: Literal) -> Option<bool> {
        lit.eval(self.value(lit.var))
    }

    /// Assigns a variable. Returns false on a conflicting assignment or a
    /// violated bound; a bound violation rolls back its own effects.
    fn assign(&mut self, var: VarId, value: bool) -> bool {
        match self.value(var) {
            Some(existing) => existing == value,
            None => {
                self.values[var.index()] = Some(value);
                self.trail.push(var);
                for bound in &mut self.bounds {
                    bound.current += bound.weight(var, value);
                }
                if self
                    .bounds
                    .iter()
                    .any(|bound| bound.current > bound.limit)
                {
                    self.unassign_last();
                    return false;
                }
                true
            }
        }
    }

    fn unassign_last(&mut self) {
        let var = self.trail.pop().expect("trail is never empty here");
        let value = self.values[var.index()].take().expect("var was assigned");
        for bound in &mut self.bounds {
            bound.current -= bound.weight(var, value);
        }
        self.qhead = self.qhead.min(self.trail.len());
    }

    /// Unit propagation over the watch lists. Returns false on conflict.
    fn propagate(&mut self) -> bool {
        let clauses = self.clauses;
        while self.qhead < self.trail.len() {
            let var = self.trail[self.qhead];
            self.qhead += 1;
            let value = self.value(var).expect("trail entries are assigned");

            // The literal that just became false.
            let falsified = Literal { var, negate: value };
            let watch_idx = falsified.watch_index();

            let watchers = std::mem::take(&mut self.watches[watch_idx]);
            let mut kept = Vec::with_capacity(watchers.len());
            let mut conflict = false;

            for (pos, &clause_idx) in watchers.iter().enumerate() {
                if conflict {
                    kept.push(clause_idx);
                    continue;
                }

                let clause = &clauses[clause_idx as usize];
                let watches = self.clause_watches[clause_idx as usize];
                let slot = if clause.literals[watches[0]].watch_index() == watch_idx {
                    0
                } else {
                    1
                };
                let other = clause.literals[watches[1 - slot]];

                if self.eval(other) == Some(true) {
                    kept.push(clause_idx);
                    continue;
                }

                // Look for a replacement literal to watch.
                let replacement = clause.literals.iter().enumerate().find(|(idx, lit)| {
                    *idx != watches[0] && *idx != watches[1] && self.eval(**lit) != Some(false)
                });

                match replacement {
                    Some((new_pos, lit)) => {
                        self.clause_watches[clause_idx as usize][slot] = new_pos;
                        self.watches[lit.watch_index()].push(clause_idx);
                    }
                    None => {
                        kept.push(clause_idx);
                        match self.eval(other) {
                            // The clause is unit: the other watch must hold.
                            None => {
                                if !self.assign(other.var, other.satisfying_value()) {
                                    conflict = true;
                                }
                            }
                            Some(false) => conflict = true,
                            Some(true) => unreachable!("handled above"),
                        }
                    }
                }

                if conflict {
                    // Keep the remaining watchers registered before bailing.
                    kept.extend(watchers[pos + 1..].iter().copied());
                    break;
                }
            }

            self.watches[watch_idx].extend(kept);
            if conflict {
                return false;
            }
        }
        true
    }

    /// Chronological backtracking: flip the deepest unflipped decision.
    /// Returns false when the search space is exhausted.
    fn backtrack(&mut self) -> bool {
        while let Some(mut frame) = self.decisions.pop() {
            while self.trail.len() > frame.trail_mark {
                self.unassign_last();
            }
            self.qhead = self.trail.len();

            if !frame.flipped {
                frame.value = !frame.value;
                frame.flipped = true;
                let (var, value) = (frame.var, frame.value);
                self.decisions.push(frame);
                if self.assign(var, value) {
                    // Propagate the flipped assignment.
                    self.qhead = self.trail.len() - 1;
                    return true;
                }
                // The flip violates a bound: exhaust this frame as well.
                self.decisions.pop();
            }
        }
        false
    }

    /// Picks the next decision: the first literal that can still satisfy the
    /// first not-yet-satisfied clause; defaulting every remaining variable
    /// to false once all clauses are satisfied.
    fn decide(&self) -> Option<(VarId, bool)> {
        for (idx, clause) in self.clauses.iter().enumerate() {
            if !self.enabled[idx] {
                continue;
            }
            let mut satisfied = false;
            let mut candidate = None;
            for lit in &clause.literals {
                match self.eval(*lit) {
                    Some(true) => {
                        satisfied = true;
                        break;
                    }
                    None if candidate.is_none() => candidate = Some(*lit),
                    _ => {}
                }
            }
            if satisfied {
                continue;
            }
            if let Some(lit) = candidate {
                return Some((lit.var, lit.satisfying_value()));
            }
            // An unsatisfied clause without unassigned literals would have
            // conflicted during propagation.
        }

        (0..self.num_vars)
            .map(VarId::from_index)
            .find(|&var| self.value(var).is_none())
            .map(|var| (var, false))
    }
}

impl VarId {
    pub(crate) fn from_index(index: usize) -> Self {
        VarId(index as u32)
    }
}
