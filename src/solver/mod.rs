//! Small constraint-programming engine over integer domains.
//!
//! The model owns contiguous `[lb, ub]` integer domains, Boolean variables
//! as `[0, 1]` integers, and a closed set of constraints sufficient for
//! fixed-time assignment scheduling: cardinality, reified and/or,
//! implications, linear (in)equalities, min/max equalities, and the
//! half-reified linkage used by shift spans. Search is depth-first
//! branch-and-bound over declared decision variables with a portfolio of
//! seed-perturbed workers sharing the incumbent bound.
//!
//! Optional intervals with fixed windows compile their no-overlap
//! requirement down to pairwise presence conflicts, which is exact because
//! every window is a constant.

mod propagate;
mod search;

pub mod driver;

pub use driver::{SolveOutcome, SolveStatus, SolvedValues, SolverDriver};
pub use search::SearchStats;

use crate::grid::TickWindow;

/// Handle to an integer variable of a [`CpModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntVar(pub(crate) u32);

impl IntVar {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a Boolean variable (an integer with domain `[0, 1]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoolVar(pub(crate) IntVar);

impl BoolVar {
    /// The underlying integer variable.
    pub fn int(self) -> IntVar {
        self.0
    }

    /// Positive literal: the variable is true.
    pub fn lit(self) -> Lit {
        Lit {
            var: self,
            negated: false,
        }
    }

    /// Negative literal: the variable is false.
    pub fn negated(self) -> Lit {
        Lit {
            var: self,
            negated: true,
        }
    }
}

/// A positive or negative occurrence of a Boolean variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lit {
    pub(crate) var: BoolVar,
    pub(crate) negated: bool,
}

impl Lit {
    pub fn negate(self) -> Lit {
        Lit {
            var: self.var,
            negated: !self.negated,
        }
    }
}

/// An optional interval: a fixed tick window gated by a presence literal.
#[derive(Debug, Clone, Copy)]
pub struct OptionalInterval {
    pub window: TickWindow,
    pub presence: BoolVar,
}

/// Closed constraint set understood by the propagation engine.
#[derive(Debug, Clone)]
pub(crate) enum Constraint {
    /// Exactly one of `vars` is true.
    ExactlyOne { vars: Vec<BoolVar> },
    /// Not both `a` and `b`.
    Nand { a: BoolVar, b: BoolVar },
    /// `reif ⇔ a ∧ b`.
    AndReif { a: Lit, b: Lit, reif: BoolVar },
    /// `reif ⇔ ∃ v ∈ vars: v`.
    OrReif { vars: Vec<BoolVar>, reif: BoolVar },
    /// `premise → conclusion`.
    Implication { premise: Lit, conclusion: Lit },
    /// `target = Σ coeff·var + constant`.
    LinearEq {
        target: IntVar,
        terms: Vec<(i64, IntVar)>,
        constant: i64,
    },
    /// `target = min(vars)`.
    MinEq { target: IntVar, vars: Vec<IntVar> },
    /// `target = max(vars)`.
    MaxEq { target: IntVar, vars: Vec<IntVar> },
    /// `lit → a = b`; refuted when the domains cannot meet.
    EqIf { lit: Lit, a: IntVar, b: IntVar },
    /// `lit → var = value`.
    EqConstIf { lit: Lit, var: IntVar, value: i64 },
    /// `lit → a − b ≤ bound`.
    DiffLeIf {
        lit: Lit,
        a: IntVar,
        b: IntVar,
        bound: i64,
    },
}

/// Constraint model under construction.
///
/// Structural misuse (inverted domains, negative objective coefficients)
/// does not panic: it marks the model invalid, and the driver reports
/// `MODEL_INVALID` without searching.
#[derive(Debug, Default, Clone)]
pub struct CpModel {
    pub(crate) bounds: Vec<(i64, i64)>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) objective: Vec<(i64, IntVar)>,
    pub(crate) decisions: Vec<BoolVar>,
    pub(crate) invalid: Option<String>,
}

impl CpModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_int_var(&mut self, lb: i64, ub: i64) -> IntVar {
        if lb > ub {
            self.invalid = Some(format!("inverted domain [{lb}, {ub}]"));
        }
        let var = IntVar(self.bounds.len() as u32);
        self.bounds.push((lb.min(ub), ub.max(lb)));
        var
    }

    pub fn new_bool_var(&mut self) -> BoolVar {
        BoolVar(self.new_int_var(0, 1))
    }

    /// A variable fixed to a single value, used to mix constants into
    /// min/max lists.
    pub fn new_constant(&mut self, value: i64) -> IntVar {
        self.new_int_var(value, value)
    }

    pub fn num_vars(&self) -> usize {
        self.bounds.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Marks a Boolean as a search decision. Search branches only on
    /// declared decisions; everything else must be fixed by propagation.
    pub fn add_decision(&mut self, var: BoolVar) {
        self.decisions.push(var);
    }

    pub fn add_exactly_one(&mut self, vars: &[BoolVar]) {
        if vars.is_empty() {
            self.invalid = Some("exactly-one over an empty set".to_string());
            return;
        }
        self.constraints.push(Constraint::ExactlyOne {
            vars: vars.to_vec(),
        });
    }

    pub fn add_nand(&mut self, a: BoolVar, b: BoolVar) {
        self.constraints.push(Constraint::Nand { a, b });
    }

    pub fn add_and_reif(&mut self, a: Lit, b: Lit, reif: BoolVar) {
        self.constraints.push(Constraint::AndReif { a, b, reif });
    }

    pub fn add_or_reif(&mut self, vars: &[BoolVar], reif: BoolVar) {
        self.constraints.push(Constraint::OrReif {
            vars: vars.to_vec(),
            reif,
        });
    }

    pub fn add_implication(&mut self, premise: Lit, conclusion: Lit) {
        self.constraints.push(Constraint::Implication {
            premise,
            conclusion,
        });
    }

    pub fn add_linear_eq(&mut self, target: IntVar, terms: &[(i64, IntVar)], constant: i64) {
        self.constraints.push(Constraint::LinearEq {
            target,
            terms: terms.to_vec(),
            constant,
        });
    }

    pub fn add_min_eq(&mut self, target: IntVar, vars: &[IntVar]) {
        if vars.is_empty() {
            self.invalid = Some("min-equality over an empty set".to_string());
            return;
        }
        self.constraints.push(Constraint::MinEq {
            target,
            vars: vars.to_vec(),
        });
    }

    pub fn add_max_eq(&mut self, target: IntVar, vars: &[IntVar]) {
        if vars.is_empty() {
            self.invalid = Some("max-equality over an empty set".to_string());
            return;
        }
        self.constraints.push(Constraint::MaxEq {
            target,
            vars: vars.to_vec(),
        });
    }

    pub fn add_eq_if(&mut self, lit: Lit, a: IntVar, b: IntVar) {
        self.constraints.push(Constraint::EqIf { lit, a, b });
    }

    pub fn add_eq_const_if(&mut self, lit: Lit, var: IntVar, value: i64) {
        self.constraints.push(Constraint::EqConstIf { lit, var, value });
    }

    pub fn add_diff_le_if(&mut self, lit: Lit, a: IntVar, b: IntVar, bound: i64) {
        self.constraints.push(Constraint::DiffLeIf { lit, a, b, bound });
    }

    /// No two present intervals may overlap in time.
    ///
    /// Windows are constants, so the global constraint reduces exactly to
    /// one presence conflict per time-overlapping pair.
    pub fn add_no_overlap(&mut self, intervals: &[OptionalInterval]) {
        for (i, first) in intervals.iter().enumerate() {
            for second in &intervals[i + 1..] {
                if first.window.overlaps(&second.window) {
                    self.add_nand(first.presence, second.presence);
                }
            }
        }
    }

    /// Sets the objective `minimize Σ coeff·var`.
    ///
    /// Coefficients must be non-negative: the bound used for pruning is
    /// the sum of domain lower bounds.
    pub fn minimize(&mut self, terms: Vec<(i64, IntVar)>) {
        if terms.iter().any(|(c, _)| *c < 0) {
            self.invalid = Some("negative objective coefficient".to_string());
            return;
        }
        self.objective = terms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_vars_are_unit_range_ints() {
        let mut model = CpModel::new();
        let b = model.new_bool_var();
        assert_eq!(model.bounds[b.int().index()], (0, 1));
    }

    #[test]
    fn inverted_domain_marks_model_invalid() {
        let mut model = CpModel::new();
        model.new_int_var(5, 3);
        assert!(model.invalid.is_some());
    }

    #[test]
    fn negative_objective_coefficient_marks_model_invalid() {
        let mut model = CpModel::new();
        let v = model.new_int_var(0, 10);
        model.minimize(vec![(-1, v)]);
        assert!(model.invalid.is_some());
    }

    #[test]
    fn no_overlap_adds_conflicts_only_for_overlapping_windows() {
        let mut model = CpModel::new();
        let windows = [
            TickWindow { start: 0, end: 10 },
            TickWindow { start: 5, end: 15 },
            TickWindow { start: 20, end: 30 },
        ];
        let intervals: Vec<OptionalInterval> = windows
            .iter()
            .map(|w| OptionalInterval {
                window: *w,
                presence: model.new_bool_var(),
            })
            .collect();
        model.add_no_overlap(&intervals);
        // only the first pair overlaps
        assert_eq!(model.num_constraints(), 1);
    }

    #[test]
    fn literal_negation_roundtrips() {
        let mut model = CpModel::new();
        let b = model.new_bool_var();
        assert_eq!(b.lit().negate(), b.negated());
        assert_eq!(b.lit().negate().negate(), b.lit());
    }
}
