//! Depth-first branch-and-bound over the declared decision variables.
//!
//! Every worker explores the full tree; workers differ only in their
//! seed-perturbed value ordering and prune against a shared incumbent
//! bound. A worker that finishes without hitting a limit has proved
//! optimality (or infeasibility) regardless of what the others did.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::propagate::{propagate, DomainStore};
use super::{BoolVar, CpModel};

/// Search counters, merged across workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SearchStats {
    pub decisions: u64,
    pub conflicts: u64,
    pub solutions: u64,
    pub workers: u32,
}

impl SearchStats {
    fn merge(&mut self, other: &SearchStats) {
        self.decisions += other.decisions;
        self.conflicts += other.conflicts;
        self.solutions += other.solutions;
    }
}

/// A complete fixed assignment with its objective value.
#[derive(Debug, Clone)]
pub(crate) struct Solution {
    pub values: Vec<i64>,
    pub objective: i64,
}

pub(crate) struct SearchResult {
    pub best: Option<Solution>,
    /// True when at least one worker exhausted the tree: the incumbent is
    /// optimal, or its absence proves infeasibility.
    pub complete: bool,
    pub stats: SearchStats,
}

pub(crate) struct SearchSettings {
    pub deadline: Option<Instant>,
    pub num_workers: u32,
    pub seed: u64,
    /// Perturb value ordering in workers past the first.
    pub portfolio: bool,
    pub max_conflicts: Option<u64>,
    pub max_branches: Option<u64>,
}

struct SharedBest {
    bound: AtomicI64,
    incumbent: Mutex<Option<Solution>>,
}

/// Hit a limit before the tree was exhausted.
struct Abort;

pub(crate) fn run_search(model: &CpModel, settings: &SearchSettings) -> SearchResult {
    let mut stats = SearchStats {
        workers: settings.num_workers,
        ..Default::default()
    };

    let mut root = DomainStore::from_model(model);
    if propagate(model, &mut root).is_err() {
        stats.conflicts = 1;
        return SearchResult {
            best: None,
            complete: true,
            stats,
        };
    }

    let shared = SharedBest {
        bound: AtomicI64::new(i64::MAX),
        incumbent: Mutex::new(None),
    };

    let mut complete = false;
    if settings.num_workers <= 1 {
        let (worker_stats, exhausted) = run_worker(model, &root, settings, &shared, 0);
        stats.merge(&worker_stats);
        complete = exhausted;
    } else {
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for worker_id in 0..settings.num_workers {
                let root = root.clone();
                let shared = &shared;
                handles.push(
                    scope.spawn(move || run_worker(model, &root, settings, shared, worker_id)),
                );
            }
            for handle in handles {
                if let Ok((worker_stats, exhausted)) = handle.join() {
                    stats.merge(&worker_stats);
                    complete |= exhausted;
                }
            }
        });
    }

    let best = shared
        .incumbent
        .into_inner()
        .expect("incumbent lock poisoned");
    SearchResult {
        best,
        complete,
        stats,
    }
}

fn run_worker(
    model: &CpModel,
    root: &DomainStore,
    settings: &SearchSettings,
    shared: &SharedBest,
    worker_id: u32,
) -> (SearchStats, bool) {
    let prefs = value_preferences(model, settings, worker_id);
    let mut worker = Worker {
        model,
        prefs,
        shared,
        deadline: settings.deadline,
        max_conflicts: settings.max_conflicts,
        max_branches: settings.max_branches,
        stats: SearchStats::default(),
    };
    let exhausted = worker.explore(root.clone()).is_ok();
    (worker.stats, exhausted)
}

/// Preferred first branch value per decision index.
fn value_preferences(model: &CpModel, settings: &SearchSettings, worker_id: u32) -> Vec<bool> {
    if settings.portfolio && worker_id > 0 {
        let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(worker_id as u64));
        model.decisions.iter().map(|_| rng.gen_bool(0.5)).collect()
    } else {
        vec![true; model.decisions.len()]
    }
}

struct Worker<'a> {
    model: &'a CpModel,
    prefs: Vec<bool>,
    shared: &'a SharedBest,
    deadline: Option<Instant>,
    max_conflicts: Option<u64>,
    max_branches: Option<u64>,
    stats: SearchStats,
}

impl Worker<'_> {
    /// Explores the subtree under an already-propagated store.
    fn explore(&mut self, store: DomainStore) -> Result<(), Abort> {
        self.check_limits()?;

        // prune against the shared incumbent
        let objective_floor: i64 = self
            .model
            .objective
            .iter()
            .map(|&(c, v)| c * store.lb(v))
            .sum();
        if objective_floor >= self.shared.bound.load(Ordering::SeqCst) {
            return Ok(());
        }

        let Some((index, var)) = self.next_decision(&store) else {
            self.record(&store);
            return Ok(());
        };

        self.stats.decisions += 1;
        let first = self.prefs[index];
        for value in [first, !first] {
            let mut child = store.clone();
            let assigned = child
                .assign(var.int(), value as i64)
                .and_then(|_| propagate(self.model, &mut child));
            match assigned {
                Ok(()) => self.explore(child)?,
                Err(_) => self.stats.conflicts += 1,
            }
        }
        Ok(())
    }

    fn next_decision(&self, store: &DomainStore) -> Option<(usize, BoolVar)> {
        self.model
            .decisions
            .iter()
            .enumerate()
            .find(|(_, v)| !store.is_fixed(v.int()))
            .map(|(i, v)| (i, *v))
    }

    fn record(&mut self, store: &DomainStore) {
        let objective: i64 = self
            .model
            .objective
            .iter()
            .map(|&(c, v)| c * store.lb(v))
            .sum();

        let mut incumbent = self
            .shared
            .incumbent
            .lock()
            .expect("incumbent lock poisoned");
        let improves = incumbent
            .as_ref()
            .map_or(true, |best| objective < best.objective);
        if improves {
            self.shared.bound.store(objective, Ordering::SeqCst);
            *incumbent = Some(Solution {
                values: store.snapshot(),
                objective,
            });
            self.stats.solutions += 1;
        }
    }

    fn check_limits(&self) -> Result<(), Abort> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Abort);
            }
        }
        if let Some(cap) = self.max_conflicts {
            if self.stats.conflicts >= cap {
                return Err(Abort);
            }
        }
        if let Some(cap) = self.max_branches {
            if self.stats.decisions >= cap {
                return Err(Abort);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SearchSettings {
        SearchSettings {
            deadline: None,
            num_workers: 1,
            seed: 0,
            portfolio: false,
            max_conflicts: None,
            max_branches: None,
        }
    }

    #[test]
    fn finds_the_cheaper_of_two_choices() {
        let mut model = CpModel::new();
        let a = model.new_bool_var();
        let b = model.new_bool_var();
        model.add_exactly_one(&[a, b]);
        model.add_decision(a);
        model.add_decision(b);
        // choosing a costs 5, choosing b costs 2
        model.minimize(vec![(5, a.int()), (2, b.int())]);

        let result = run_search(&model, &settings());
        assert!(result.complete);
        let best = result.best.unwrap();
        assert_eq!(best.objective, 2);
        assert_eq!(best.values[a.int().index()], 0);
        assert_eq!(best.values[b.int().index()], 1);
    }

    #[test]
    fn pigeonhole_is_infeasible() {
        // two items, one slot each, but the slots conflict pairwise
        let mut model = CpModel::new();
        let a = model.new_bool_var();
        let b = model.new_bool_var();
        model.add_exactly_one(&[a]);
        model.add_exactly_one(&[b]);
        model.add_nand(a, b);
        model.add_decision(a);
        model.add_decision(b);

        let result = run_search(&model, &settings());
        assert!(result.complete);
        assert!(result.best.is_none());
    }

    #[test]
    fn no_decisions_yields_immediate_solution() {
        let mut model = CpModel::new();
        let v = model.new_int_var(3, 3);
        model.minimize(vec![(2, v)]);
        let result = run_search(&model, &settings());
        assert!(result.complete);
        assert_eq!(result.best.unwrap().objective, 6);
    }

    #[test]
    fn portfolio_workers_agree_on_objective() {
        let mut model = CpModel::new();
        let vars: Vec<_> = (0..4).map(|_| model.new_bool_var()).collect();
        model.add_exactly_one(&vars);
        for &v in &vars {
            model.add_decision(v);
        }
        let costs: Vec<(i64, _)> = vars
            .iter()
            .zip([7i64, 3, 9, 4])
            .map(|(v, c)| (c, v.int()))
            .collect();
        model.minimize(costs);

        let mut many = settings();
        many.num_workers = 3;
        many.portfolio = true;
        many.seed = 11;
        let result = run_search(&model, &many);
        assert!(result.complete);
        assert_eq!(result.best.unwrap().objective, 3);
    }

    #[test]
    fn branch_cap_aborts_without_proof() {
        let mut model = CpModel::new();
        let vars: Vec<_> = (0..8).map(|_| model.new_bool_var()).collect();
        for &v in &vars {
            model.add_decision(v);
        }
        let mut s = settings();
        s.max_branches = Some(2);
        let result = run_search(&model, &s);
        assert!(!result.complete);
    }
}
