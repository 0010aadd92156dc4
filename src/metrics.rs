//! Run metrics and the shared piecewise staffing-cost formula.
//!
//! The cost recomputation here is the float-exact counterpart of the
//! solver's scaled integer objective; the validator and the metrics
//! report both go through it so the two never disagree.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::error::SchedulerError;
use crate::extract::SolutionRow;
use crate::solver::driver::ENGINE_NAME;
use crate::solver::SolveStatus;

/// Paid hours for one anesthetist span: `max(shift_min, span)` plus the
/// overtime surcharge above `shift_overtime`.
pub fn piecewise_cost_hours(span_hours: f64, cfg: &Config) -> f64 {
    let base = cfg.shift_min.max(span_hours);
    let overtime = (span_hours - cfg.shift_overtime).max(0.0);
    base + (cfg.overtime_multiplier - 1.0) * overtime
}

/// Whole-schedule aggregates derived from solution rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleAggregates {
    pub total_surgery_hours: f64,
    pub total_cost_hours: f64,
    pub utilization: f64,
    pub num_anesthetists: usize,
    pub num_rooms_used: usize,
}

/// Groups rows per anesthetist and folds spans through the cost formula.
pub fn aggregate_schedule(rows: &[SolutionRow], cfg: &Config) -> ScheduleAggregates {
    let mut total_surgery_hours = 0.0;
    let mut spans: BTreeMap<&str, (DateTime<Utc>, DateTime<Utc>)> = BTreeMap::new();
    let mut rooms: Vec<&str> = Vec::new();

    for row in rows {
        total_surgery_hours += (row.end_time - row.start_time).num_seconds() as f64 / 3600.0;
        spans
            .entry(row.anesthetist_id.as_str())
            .and_modify(|(start, end)| {
                *start = (*start).min(row.start_time);
                *end = (*end).max(row.end_time);
            })
            .or_insert((row.start_time, row.end_time));
        if !rooms.contains(&row.room_id.as_str()) {
            rooms.push(row.room_id.as_str());
        }
    }

    let total_cost_hours: f64 = spans
        .values()
        .map(|(start, end)| {
            let span_hours = (*end - *start).num_seconds() as f64 / 3600.0;
            piecewise_cost_hours(span_hours.max(0.0), cfg)
        })
        .sum();

    let utilization = if total_cost_hours > 0.0 {
        total_surgery_hours / total_cost_hours
    } else {
        0.0
    };

    ScheduleAggregates {
        total_surgery_hours,
        total_cost_hours,
        utilization,
        num_anesthetists: spans.len(),
        num_rooms_used: rooms.len(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SolverInfo {
    pub engine: String,
    pub num_workers: u32,
    pub seed: u64,
    pub version: String,
}

/// The `metrics.json` payload.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub timestamp: String,
    pub solver_status: String,
    pub total_cost: f64,
    pub utilization: f64,
    pub runtime_sec: f64,
    pub num_anesthetists: usize,
    pub num_rooms_used: usize,
    pub num_surgeries: usize,
    pub solver: SolverInfo,
}

/// Builds the metrics payload, rejecting anything non-serializable.
pub fn collect_metrics(
    rows: &[SolutionRow],
    num_surgeries: usize,
    status: SolveStatus,
    runtime_sec: f64,
    cfg: &Config,
) -> Result<RunMetrics, SchedulerError> {
    let aggregates = aggregate_schedule(rows, cfg);

    let metrics = RunMetrics {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        solver_status: status.as_str().to_string(),
        total_cost: clamp_tiny(aggregates.total_cost_hours),
        utilization: clamp_tiny(aggregates.utilization),
        runtime_sec: clamp_tiny(runtime_sec),
        num_anesthetists: aggregates.num_anesthetists,
        num_rooms_used: aggregates.num_rooms_used,
        num_surgeries,
        solver: SolverInfo {
            engine: ENGINE_NAME.to_string(),
            num_workers: cfg.solver.num_workers,
            seed: cfg.solver.random_seed,
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    for (name, value) in [
        ("total_cost", metrics.total_cost),
        ("utilization", metrics.utilization),
        ("runtime_sec", metrics.runtime_sec),
    ] {
        if !value.is_finite() {
            return Err(SchedulerError::data(
                format!("metric '{name}' is non-finite"),
                "collect_metrics",
                "Inspect the input schedule; check times and units.",
            ));
        }
    }
    Ok(metrics)
}

fn clamp_tiny(x: f64) -> f64 {
    if x.abs() < 1e-15 {
        0.0
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, start: &str, end: &str, anesthetist: &str, room: &str) -> SolutionRow {
        SolutionRow {
            surgery_id: id.to_string(),
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            anesthetist_id: anesthetist.to_string(),
            room_id: room.to_string(),
        }
    }

    #[test]
    fn cost_below_minimum_pays_minimum() {
        let cfg = Config::default();
        assert_eq!(piecewise_cost_hours(2.0, &cfg), 5.0);
        assert_eq!(piecewise_cost_hours(5.0, &cfg), 5.0);
    }

    #[test]
    fn cost_above_overtime_pays_multiplier() {
        let cfg = Config::default();
        // 11h span: 11 base + 0.5 × 2h overtime
        assert!((piecewise_cost_hours(11.0, &cfg) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn aggregates_group_by_anesthetist() {
        let cfg = Config::default();
        let rows = vec![
            row("s1", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z", "A001", "R0"),
            row("s2", "2025-01-01T10:00:00Z", "2025-01-01T11:00:00Z", "A001", "R0"),
            row("s3", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z", "A002", "R1"),
        ];
        let agg = aggregate_schedule(&rows, &cfg);
        assert_eq!(agg.num_anesthetists, 2);
        assert_eq!(agg.num_rooms_used, 2);
        assert!((agg.total_surgery_hours - 3.0).abs() < 1e-12);
        // A001 spans 3h → paid 5; A002 spans 1h → paid 5
        assert!((agg.total_cost_hours - 10.0).abs() < 1e-12);
        assert!((agg.utilization - 0.3).abs() < 1e-12);
    }

    #[test]
    fn empty_schedule_has_zero_metrics() {
        let cfg = Config::default();
        let metrics = collect_metrics(&[], 0, SolveStatus::Optimal, 0.01, &cfg).unwrap();
        assert_eq!(metrics.total_cost, 0.0);
        assert_eq!(metrics.utilization, 0.0);
        assert_eq!(metrics.num_anesthetists, 0);
        assert_eq!(metrics.num_surgeries, 0);
        assert_eq!(metrics.solver_status, "OPTIMAL");
    }

    #[test]
    fn metrics_serialize_to_flat_json() {
        let cfg = Config::default();
        let rows = vec![row(
            "s1",
            "2025-01-01T08:00:00Z",
            "2025-01-01T09:00:00Z",
            "A001",
            "R0",
        )];
        let metrics = collect_metrics(&rows, 1, SolveStatus::Feasible, 1.5, &cfg).unwrap();
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["solver_status"], "FEASIBLE");
        assert_eq!(json["num_surgeries"], 1);
        assert_eq!(json["solver"]["engine"], ENGINE_NAME);
        assert_eq!(json["solver"]["num_workers"], 4);
    }
}
