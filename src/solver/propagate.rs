//! Bounds-consistency propagation over `[lb, ub]` domains.
//!
//! Propagators run to fixpoint: every constraint is revisited until a full
//! sweep changes nothing. Domains only ever shrink; an empty domain is a
//! conflict and unwinds the current search node.

use super::{BoolVar, Constraint, CpModel, IntVar, Lit};

/// An emptied domain. Carries no payload: the search only needs to know
/// the node is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict;

/// Current lower/upper bounds for every variable of a model.
#[derive(Debug, Clone)]
pub(crate) struct DomainStore {
    lb: Vec<i64>,
    ub: Vec<i64>,
}

impl DomainStore {
    pub fn from_model(model: &CpModel) -> Self {
        Self {
            lb: model.bounds.iter().map(|(lb, _)| *lb).collect(),
            ub: model.bounds.iter().map(|(_, ub)| *ub).collect(),
        }
    }

    pub fn lb(&self, v: IntVar) -> i64 {
        self.lb[v.index()]
    }

    pub fn ub(&self, v: IntVar) -> i64 {
        self.ub[v.index()]
    }

    pub fn fixed(&self, v: IntVar) -> Option<i64> {
        let lb = self.lb(v);
        (lb == self.ub(v)).then_some(lb)
    }

    pub fn is_fixed(&self, v: IntVar) -> bool {
        self.lb(v) == self.ub(v)
    }

    pub fn set_min(&mut self, v: IntVar, value: i64) -> Result<bool, Conflict> {
        if value > self.ub(v) {
            return Err(Conflict);
        }
        if value > self.lb(v) {
            self.lb[v.index()] = value;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn set_max(&mut self, v: IntVar, value: i64) -> Result<bool, Conflict> {
        if value < self.lb(v) {
            return Err(Conflict);
        }
        if value < self.ub(v) {
            self.ub[v.index()] = value;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn assign(&mut self, v: IntVar, value: i64) -> Result<bool, Conflict> {
        Ok(self.set_min(v, value)? | self.set_max(v, value)?)
    }

    pub fn bool_value(&self, v: BoolVar) -> Option<bool> {
        self.fixed(v.int()).map(|x| x == 1)
    }

    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.bool_value(lit.var).map(|v| v ^ lit.negated)
    }

    /// Makes the literal take the given truth value.
    pub fn assign_lit(&mut self, lit: Lit, truth: bool) -> Result<bool, Conflict> {
        let raw = (truth ^ lit.negated) as i64;
        self.assign(lit.var.int(), raw)
    }

    /// Lower bounds of every variable; equal to the assignment once the
    /// store is fully fixed.
    pub fn snapshot(&self) -> Vec<i64> {
        self.lb.clone()
    }
}

/// Runs all propagators to fixpoint.
pub(crate) fn propagate(model: &CpModel, store: &mut DomainStore) -> Result<(), Conflict> {
    loop {
        let mut changed = false;
        for constraint in &model.constraints {
            changed |= step(constraint, store)?;
        }
        if !changed {
            return Ok(());
        }
    }
}

fn step(constraint: &Constraint, store: &mut DomainStore) -> Result<bool, Conflict> {
    match constraint {
        Constraint::ExactlyOne { vars } => exactly_one(vars, store),
        Constraint::Nand { a, b } => nand(*a, *b, store),
        Constraint::AndReif { a, b, reif } => and_reif(*a, *b, *reif, store),
        Constraint::OrReif { vars, reif } => or_reif(vars, *reif, store),
        Constraint::Implication {
            premise,
            conclusion,
        } => implication(*premise, *conclusion, store),
        Constraint::LinearEq {
            target,
            terms,
            constant,
        } => linear_eq(*target, terms, *constant, store),
        Constraint::MinEq { target, vars } => min_eq(*target, vars, store),
        Constraint::MaxEq { target, vars } => max_eq(*target, vars, store),
        Constraint::EqIf { lit, a, b } => eq_if(*lit, *a, *b, store),
        Constraint::EqConstIf { lit, var, value } => eq_const_if(*lit, *var, *value, store),
        Constraint::DiffLeIf { lit, a, b, bound } => diff_le_if(*lit, *a, *b, *bound, store),
    }
}

fn exactly_one(vars: &[BoolVar], store: &mut DomainStore) -> Result<bool, Conflict> {
    let mut true_count = 0usize;
    let mut unfixed: Option<BoolVar> = None;
    let mut unfixed_count = 0usize;

    for &v in vars {
        match store.bool_value(v) {
            Some(true) => true_count += 1,
            Some(false) => {}
            None => {
                unfixed = Some(v);
                unfixed_count += 1;
            }
        }
    }

    if true_count > 1 {
        return Err(Conflict);
    }

    let mut changed = false;
    if true_count == 1 {
        for &v in vars {
            if store.bool_value(v).is_none() {
                changed |= store.assign(v.int(), 0)?;
            }
        }
        return Ok(changed);
    }

    // no variable is true yet
    match (unfixed, unfixed_count) {
        (None, _) => Err(Conflict),
        (Some(last), 1) => Ok(store.assign(last.int(), 1)?),
        _ => Ok(false),
    }
}

fn nand(a: BoolVar, b: BoolVar, store: &mut DomainStore) -> Result<bool, Conflict> {
    let mut changed = false;
    if store.bool_value(a) == Some(true) {
        changed |= store.assign(b.int(), 0)?;
    }
    if store.bool_value(b) == Some(true) {
        changed |= store.assign(a.int(), 0)?;
    }
    Ok(changed)
}

fn and_reif(a: Lit, b: Lit, reif: BoolVar, store: &mut DomainStore) -> Result<bool, Conflict> {
    let mut changed = false;
    let va = store.lit_value(a);
    let vb = store.lit_value(b);

    if va == Some(true) && vb == Some(true) {
        changed |= store.assign(reif.int(), 1)?;
    }
    if va == Some(false) || vb == Some(false) {
        changed |= store.assign(reif.int(), 0)?;
    }
    match store.bool_value(reif) {
        Some(true) => {
            changed |= store.assign_lit(a, true)?;
            changed |= store.assign_lit(b, true)?;
        }
        Some(false) => {
            if va == Some(true) {
                changed |= store.assign_lit(b, false)?;
            }
            if vb == Some(true) {
                changed |= store.assign_lit(a, false)?;
            }
        }
        None => {}
    }
    Ok(changed)
}

fn or_reif(vars: &[BoolVar], reif: BoolVar, store: &mut DomainStore) -> Result<bool, Conflict> {
    let mut changed = false;
    let mut any_true = false;
    let mut unfixed: Option<BoolVar> = None;
    let mut unfixed_count = 0usize;

    for &v in vars {
        match store.bool_value(v) {
            Some(true) => any_true = true,
            Some(false) => {}
            None => {
                unfixed = Some(v);
                unfixed_count += 1;
            }
        }
    }

    if any_true {
        changed |= store.assign(reif.int(), 1)?;
    } else if unfixed_count == 0 {
        changed |= store.assign(reif.int(), 0)?;
    }

    match store.bool_value(reif) {
        Some(false) => {
            for &v in vars {
                if store.bool_value(v).is_none() {
                    changed |= store.assign(v.int(), 0)?;
                }
            }
        }
        Some(true) => {
            if !any_true && unfixed_count == 1 {
                if let Some(last) = unfixed {
                    changed |= store.assign(last.int(), 1)?;
                }
            }
        }
        None => {}
    }
    Ok(changed)
}

fn implication(premise: Lit, conclusion: Lit, store: &mut DomainStore) -> Result<bool, Conflict> {
    let mut changed = false;
    if store.lit_value(premise) == Some(true) {
        changed |= store.assign_lit(conclusion, true)?;
    }
    if store.lit_value(conclusion) == Some(false) {
        changed |= store.assign_lit(premise, false)?;
    }
    Ok(changed)
}

fn linear_eq(
    target: IntVar,
    terms: &[(i64, IntVar)],
    constant: i64,
    store: &mut DomainStore,
) -> Result<bool, Conflict> {
    let mut changed = false;

    let term_bounds: Vec<(i64, i64)> = terms
        .iter()
        .map(|&(c, v)| {
            let a = c * store.lb(v);
            let b = c * store.ub(v);
            (a.min(b), a.max(b))
        })
        .collect();
    let sum_min: i64 = constant + term_bounds.iter().map(|(lo, _)| lo).sum::<i64>();
    let sum_max: i64 = constant + term_bounds.iter().map(|(_, hi)| hi).sum::<i64>();

    changed |= store.set_min(target, sum_min)?;
    changed |= store.set_max(target, sum_max)?;

    for (idx, &(c, v)) in terms.iter().enumerate() {
        if c == 0 {
            continue;
        }
        let (tmin, tmax) = term_bounds[idx];
        let rest_min = sum_min - tmin;
        let rest_max = sum_max - tmax;
        // c·v must fit inside [lb(target) − rest_max, ub(target) − rest_min]
        let lo = store.lb(target) - rest_max;
        let hi = store.ub(target) - rest_min;
        let (v_min, v_max) = if c > 0 {
            (div_ceil(lo, c), div_floor(hi, c))
        } else {
            (div_ceil(hi, c), div_floor(lo, c))
        };
        changed |= store.set_min(v, v_min)?;
        changed |= store.set_max(v, v_max)?;
    }
    Ok(changed)
}

fn min_eq(target: IntVar, vars: &[IntVar], store: &mut DomainStore) -> Result<bool, Conflict> {
    let mut changed = false;
    let min_lb = vars.iter().map(|&v| store.lb(v)).min().unwrap_or(0);
    let min_ub = vars.iter().map(|&v| store.ub(v)).min().unwrap_or(0);
    changed |= store.set_min(target, min_lb)?;
    changed |= store.set_max(target, min_ub)?;

    for &v in vars {
        changed |= store.set_min(v, store.lb(target))?;
    }

    // if only one variable can reach down to the minimum, it must
    let reachable: Vec<IntVar> = vars
        .iter()
        .copied()
        .filter(|&v| store.lb(v) <= store.ub(target))
        .collect();
    if let &[only] = &reachable[..] {
        changed |= store.set_max(only, store.ub(target))?;
    }
    Ok(changed)
}

fn max_eq(target: IntVar, vars: &[IntVar], store: &mut DomainStore) -> Result<bool, Conflict> {
    let mut changed = false;
    let max_lb = vars.iter().map(|&v| store.lb(v)).max().unwrap_or(0);
    let max_ub = vars.iter().map(|&v| store.ub(v)).max().unwrap_or(0);
    changed |= store.set_min(target, max_lb)?;
    changed |= store.set_max(target, max_ub)?;

    for &v in vars {
        changed |= store.set_max(v, store.ub(target))?;
    }

    let reachable: Vec<IntVar> = vars
        .iter()
        .copied()
        .filter(|&v| store.ub(v) >= store.lb(target))
        .collect();
    if let &[only] = &reachable[..] {
        changed |= store.set_min(only, store.lb(target))?;
    }
    Ok(changed)
}

fn eq_if(lit: Lit, a: IntVar, b: IntVar, store: &mut DomainStore) -> Result<bool, Conflict> {
    match store.lit_value(lit) {
        Some(true) => {
            let mut changed = false;
            changed |= store.set_min(a, store.lb(b))?;
            changed |= store.set_max(a, store.ub(b))?;
            changed |= store.set_min(b, store.lb(a))?;
            changed |= store.set_max(b, store.ub(a))?;
            Ok(changed)
        }
        Some(false) => Ok(false),
        None => {
            if store.ub(a) < store.lb(b) || store.ub(b) < store.lb(a) {
                store.assign_lit(lit, false)
            } else {
                Ok(false)
            }
        }
    }
}

fn eq_const_if(lit: Lit, var: IntVar, value: i64, store: &mut DomainStore) -> Result<bool, Conflict> {
    match store.lit_value(lit) {
        Some(true) => store.assign(var, value),
        Some(false) => Ok(false),
        None => {
            if value < store.lb(var) || value > store.ub(var) {
                store.assign_lit(lit, false)
            } else {
                Ok(false)
            }
        }
    }
}

fn diff_le_if(
    lit: Lit,
    a: IntVar,
    b: IntVar,
    bound: i64,
    store: &mut DomainStore,
) -> Result<bool, Conflict> {
    match store.lit_value(lit) {
        Some(true) => {
            let mut changed = false;
            changed |= store.set_max(a, store.ub(b) + bound)?;
            changed |= store.set_min(b, store.lb(a) - bound)?;
            Ok(changed)
        }
        Some(false) => Ok(false),
        None => {
            if store.lb(a) - store.ub(b) > bound {
                store.assign_lit(lit, false)
            } else {
                Ok(false)
            }
        }
    }
}

fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && ((r < 0) == (b < 0)) {
        q + 1
    } else {
        q
    }
}
