//! End-to-end orchestration: load → build → solve → extract → validate →
//! export.
//!
//! A non-feasible solver outcome is not an error here: it produces an
//! empty schedule plus a validation report explaining the status, and the
//! caller maps `valid = false` onto the controlled exit code.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{LoadIssue, SurgeriesLoader};
use crate::error::SchedulerError;
use crate::export;
use crate::extract::extract_assignments;
use crate::metrics::collect_metrics;
use crate::model::ModelBuilder;
use crate::solver::{SolveStatus, SolverDriver};
use crate::validator::{ValidationReport, Validator};

/// Paths of the artifacts a run produced.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub solution_csv: PathBuf,
    pub validation_report: PathBuf,
    pub metrics: PathBuf,
    pub solver_log: Option<PathBuf>,
    pub load_errors: Option<PathBuf>,
}

/// Outcome handed back to the CLI.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub valid: bool,
    pub status: SolveStatus,
    pub objective: Option<i64>,
    pub runtime_seconds: f64,
    pub artifacts: Artifacts,
}

/// Payload of `load_errors.json` when the input CSV has row issues.
#[derive(Debug, Serialize)]
struct LoadErrorsArtifact<'a> {
    success: bool,
    total_rows: usize,
    errors: &'a [LoadIssue],
}

/// Runs the whole scheduling pipeline.
///
/// Raises only for controlled failures (configuration, data, model,
/// claimed-feasible-but-malformed solutions); infeasible and unknown
/// solver outcomes return normally with `valid = false`.
pub fn run_pipeline(
    config_path: &Path,
    input_path: &Path,
    output_dir: &Path,
) -> Result<PipelineResult, SchedulerError> {
    info!(path = %config_path.display(), "loading config");
    let cfg = Config::load(config_path)?;

    info!(path = %input_path.display(), "loading surgeries");
    let load = SurgeriesLoader::new().load(input_path)?;
    if !load.success {
        let load_errors_path = output_dir.join("load_errors.json");
        export::write_json(
            &LoadErrorsArtifact {
                success: false,
                total_rows: load.total_rows,
                errors: &load.errors,
            },
            &load_errors_path,
        )?;
        return Err(SchedulerError::data(
            format!("surgeries load failed — see {}", load_errors_path.display()),
            "run_pipeline",
            "Fix the CSV issues reported in load_errors.json and rerun.",
        ));
    }
    let surgeries = load.surgeries;

    info!(surgeries = surgeries.len(), "building model");
    let built = ModelBuilder::new(&cfg, &surgeries).build()?;

    info!("solving");
    let driver = SolverDriver::new(cfg.solver.clone());
    let outcome = driver.solve(&built.model);

    if outcome.status == SolveStatus::ModelInvalid {
        return Err(SchedulerError::solve(
            "solver rejected the model as invalid",
            "run_pipeline",
            "This indicates a model construction defect; inspect the build logs.",
        ));
    }

    // diagnostics are best-effort: a failed log write never fails the run
    let solver_log_path = output_dir.join("solver.log");
    let solver_log = match export::write_text(&driver.render_log(&outcome), &solver_log_path) {
        Ok(()) => Some(solver_log_path),
        Err(e) => {
            warn!(error = %e, "solver log not written");
            None
        }
    };
    if let Err(e) = export::write_json(&cfg, &output_dir.join("config_snapshot.json")) {
        warn!(error = %e, "config snapshot not written");
    }

    info!(status = outcome.status.as_str(), "validating assignments");
    let (rows, report) = if outcome.status.has_solution() {
        let values = outcome.values.as_ref().ok_or_else(|| {
            SchedulerError::solve(
                "feasible status without variable values",
                "run_pipeline",
                "This indicates a solver defect; rerun with logging enabled.",
            )
        })?;
        let rows = extract_assignments(&built, values, &surgeries)?;
        let report = Validator::new(&rows, &surgeries, &cfg).run()?;
        (rows, report)
    } else {
        warn!(
            status = outcome.status.as_str(),
            "solver finished without a usable solution"
        );
        let report = ValidationReport::solver_status_failure(
            outcome.status,
            surgeries.len(),
            outcome.objective,
            outcome.runtime_seconds,
        );
        (Vec::new(), report)
    };

    let validation_report_path = output_dir.join("validation_report.json");
    export::write_json(&report, &validation_report_path)?;
    if !report.valid {
        warn!("validation report marked invalid");
    }

    info!("collecting metrics");
    let metrics = collect_metrics(
        &rows,
        surgeries.len(),
        outcome.status,
        outcome.runtime_seconds,
        &cfg,
    )?;
    let metrics_path = output_dir.join("metrics.json");
    export::write_json(&metrics, &metrics_path)?;

    info!("exporting solution.csv");
    let solution_path = output_dir.join("solution.csv");
    export::write_solution_csv(&rows, &solution_path)?;

    info!(
        valid = report.valid,
        status = outcome.status.as_str(),
        runtime_seconds = outcome.runtime_seconds,
        "pipeline finished"
    );

    Ok(PipelineResult {
        valid: report.valid,
        status: outcome.status,
        objective: outcome.objective,
        runtime_seconds: outcome.runtime_seconds,
        artifacts: Artifacts {
            solution_csv: solution_path,
            validation_report: validation_report_path,
            metrics: metrics_path,
            solver_log,
            load_errors: None,
        },
    })
}
