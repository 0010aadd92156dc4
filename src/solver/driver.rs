//! Thin adapter between the pipeline and the search engine.
//!
//! Owns parameter resolution, wall-clock accounting, and the mapping from
//! raw search results onto the public status vocabulary. Parameters with
//! no engine counterpart are accepted and logged so configuration files
//! written for CP-SAT remain loadable.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::search::{run_search, SearchSettings, SearchStats};
use super::{BoolVar, CpModel, IntVar};
use crate::config::{SearchBranching, SolverParams};

/// Engine identifier recorded in metrics and logs.
pub const ENGINE_NAME: &str = "opsched-bnb";

/// Public solver status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    ModelInvalid,
    Unknown,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimal => "OPTIMAL",
            Self::Feasible => "FEASIBLE",
            Self::Infeasible => "INFEASIBLE",
            Self::ModelInvalid => "MODEL_INVALID",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// True when assignments can be extracted.
    pub fn has_solution(&self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

/// Frozen variable values of the winning assignment.
#[derive(Debug, Clone)]
pub struct SolvedValues {
    values: Vec<i64>,
}

impl SolvedValues {
    pub fn value(&self, var: IntVar) -> i64 {
        self.values[var.index()]
    }

    pub fn bool_value(&self, var: BoolVar) -> bool {
        self.value(var.int()) == 1
    }
}

/// Everything the pipeline needs from one solve call.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub objective: Option<i64>,
    pub runtime_seconds: f64,
    pub values: Option<SolvedValues>,
    pub stats: SearchStats,
}

/// Configured solver front end.
#[derive(Debug, Clone)]
pub struct SolverDriver {
    params: SolverParams,
}

impl SolverDriver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Runs the search and maps the result onto the public statuses.
    ///
    /// `FEASIBLE` means a limit was hit with an incumbent in hand;
    /// `UNKNOWN` means a limit was hit with none.
    pub fn solve(&self, model: &CpModel) -> SolveOutcome {
        let started = Instant::now();
        self.log_run_header(model);

        if let Some(reason) = &model.invalid {
            info!(%reason, "model rejected before search");
            return SolveOutcome {
                status: SolveStatus::ModelInvalid,
                objective: None,
                runtime_seconds: started.elapsed().as_secs_f64(),
                values: None,
                stats: SearchStats::default(),
            };
        }

        let settings = SearchSettings {
            deadline: (self.params.max_time_in_seconds > 0.0)
                .then(|| started + Duration::from_secs_f64(self.params.max_time_in_seconds)),
            num_workers: self.resolve_workers(),
            seed: self.params.random_seed,
            portfolio: self.params.search_branching != SearchBranching::FixedSearch,
            max_conflicts: self.params.max_num_conflicts,
            max_branches: self.params.max_num_branches,
        };

        let result = run_search(model, &settings);
        let runtime_seconds = started.elapsed().as_secs_f64();

        let status = match (&result.best, result.complete) {
            (Some(_), true) => SolveStatus::Optimal,
            (Some(_), false) => SolveStatus::Feasible,
            (None, true) => SolveStatus::Infeasible,
            (None, false) => SolveStatus::Unknown,
        };

        info!(
            status = status.as_str(),
            objective = ?result.best.as_ref().map(|s| s.objective),
            runtime_seconds,
            decisions = result.stats.decisions,
            conflicts = result.stats.conflicts,
            "solve finished"
        );

        SolveOutcome {
            status,
            objective: result.best.as_ref().map(|s| s.objective),
            values: result.best.map(|s| SolvedValues { values: s.values }),
            runtime_seconds,
            stats: result.stats,
        }
    }

    /// Plain-text run report written to `solver.log`.
    pub fn render_log(&self, outcome: &SolveOutcome) -> String {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let parameters = serde_yaml::to_string(&self.params)
            .unwrap_or_else(|_| "<unrenderable parameters>".to_string());
        let objective = outcome
            .objective
            .map(|o| o.to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "[{timestamp}] SOLVER RUN\n\
             engine: {ENGINE_NAME} {version}\n\
             random_seed: {seed}\n\
             num_workers: {workers}\n\
             max_time_in_seconds: {max_time}\n\
             search_branching: {branching}\n\
             \n\
             == Parameters ==\n\
             {parameters}\
             \n\
             == Result ==\n\
             status: {status}\n\
             objective: {objective}\n\
             runtime_sec: {runtime:.6}\n\
             \n\
             == SearchStats ==\n\
             decisions: {decisions}\n\
             conflicts: {conflicts}\n\
             solutions: {solutions}\n\
             workers: {stats_workers}\n",
            version = env!("CARGO_PKG_VERSION"),
            seed = self.params.random_seed,
            workers = self.params.num_workers,
            max_time = self.params.max_time_in_seconds,
            branching = self.params.search_branching.as_str(),
            status = outcome.status.as_str(),
            runtime = outcome.runtime_seconds,
            decisions = outcome.stats.decisions,
            conflicts = outcome.stats.conflicts,
            solutions = outcome.stats.solutions,
            stats_workers = outcome.stats.workers,
        )
    }

    fn resolve_workers(&self) -> u32 {
        if self.params.num_workers > 0 {
            return self.params.num_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    }

    fn log_run_header(&self, model: &CpModel) {
        info!(
            engine = ENGINE_NAME,
            version = env!("CARGO_PKG_VERSION"),
            workers = self.params.num_workers,
            max_time = self.params.max_time_in_seconds,
            branching = self.params.search_branching.as_str(),
            seed = self.params.random_seed,
            vars = model.num_vars(),
            constraints = model.num_constraints(),
            "solver start"
        );
        debug!(
            presolve = self.params.cp_model_presolve,
            linearization = self.params.linearization_level,
            relative_gap = self.params.relative_gap_limit,
            absolute_gap = self.params.absolute_gap_limit,
            memory_mb = ?self.params.max_memory_in_mb,
            "parameters accepted without an engine counterpart"
        );
    }
}
