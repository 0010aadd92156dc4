//! Independent post-solve schedule verification.
//!
//! Re-derives every scheduling rule from the emitted rows without touching
//! solver state. Critical checks (`DataIntegrity`, `RoomOverlap`,
//! `NoOverlap`, `DurationLimits`) decide validity; `Buffer`,
//! `ShiftLimits`, and `Utilization` are advisory and only annotate the
//! report.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::config::Config;
use crate::domain::Surgery;
use crate::error::SchedulerError;
use crate::extract::SolutionRow;
use crate::metrics::piecewise_cost_hours;
use crate::solver::SolveStatus;


const CRITICAL_CHECKS: [&str; 4] = ["DataIntegrity", "RoomOverlap", "NoOverlap", "DurationLimits"];
const ALL_CHECKS: [&str; 7] = [
    "DataIntegrity",
    "RoomOverlap",
    "NoOverlap",
    "Buffer",
    "ShiftLimits",
    "DurationLimits",
    "Utilization",
];

/// One error or warning entry of the validation report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub check: String,
    pub message: String,
    pub entities: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Numeric summary embedded in the validation report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportMetrics {
    pub total_cost: f64,
    pub utilization: f64,
    pub num_anesthetists: usize,
    pub num_rooms_used: usize,
    pub num_surgeries: usize,
    pub num_assignments: usize,
    pub num_violations: usize,
}

/// The `validation_report.json` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub timestamp: String,
    pub valid: bool,
    pub errors: Vec<ReportEntry>,
    pub warnings: Vec<ReportEntry>,
    pub metrics: ReportMetrics,
    pub checks: BTreeMap<String, bool>,
}

impl ValidationReport {
    /// Minimal report for runs the solver could not bring to a solution;
    /// replaces the check battery with a single `SolverStatus` failure.
    pub fn solver_status_failure(
        status: SolveStatus,
        num_surgeries: usize,
        objective: Option<i64>,
        runtime_seconds: f64,
    ) -> Self {
        let mut checks = BTreeMap::new();
        checks.insert("SolverStatus".to_string(), false);
        Self {
            timestamp: now_iso(),
            valid: false,
            errors: vec![ReportEntry {
                check: "SolverStatus".to_string(),
                message: format!("No feasible solution found (status={})", status.as_str()),
                entities: json!({
                    "status": status.as_str(),
                    "objective": objective,
                    "runtime_seconds": runtime_seconds,
                }),
                suggested_action: Some(
                    "Inspect model constraints and data consistency".to_string(),
                ),
            }],
            warnings: Vec::new(),
            metrics: ReportMetrics {
                num_surgeries,
                ..ReportMetrics::default()
            },
            checks,
        }
    }
}

/// Post-solution schedule validator.
///
/// Raises only for corrupted input structures (empty or non-matching
/// assignment sets when a solution was claimed); business-rule violations
/// are collected into the report.
pub struct Validator<'a> {
    assignments: &'a [SolutionRow],
    surgeries: &'a [Surgery],
    cfg: &'a Config,
    surgery_by_id: HashMap<&'a str, &'a Surgery>,
    errors: Vec<ReportEntry>,
    warnings: Vec<ReportEntry>,
    checks: BTreeMap<String, bool>,
    metrics: ReportMetrics,
}

impl<'a> Validator<'a> {
    pub fn new(assignments: &'a [SolutionRow], surgeries: &'a [Surgery], cfg: &'a Config) -> Self {
        let surgery_by_id = surgeries
            .iter()
            .map(|s| (s.surgery_id.as_str(), s))
            .collect();
        Self {
            assignments,
            surgeries,
            cfg,
            surgery_by_id,
            errors: Vec::new(),
            warnings: Vec::new(),
            checks: BTreeMap::new(),
            metrics: ReportMetrics::default(),
        }
    }

    /// Runs the full check battery and assembles the report.
    pub fn run(mut self) -> Result<ValidationReport, SchedulerError> {
        // empty input short-circuits to a trivially valid report
        if self.surgeries.is_empty() && self.assignments.is_empty() {
            for name in ALL_CHECKS {
                self.checks.insert(name.to_string(), true);
            }
            return Ok(self.build_report());
        }

        self.check_data_integrity()?;
        if self.checks.get("DataIntegrity") == Some(&false) {
            for name in ALL_CHECKS.iter().skip(1) {
                self.checks.insert(name.to_string(), false);
            }
            return Ok(self.build_report());
        }

        self.check_room_overlaps();
        self.check_anesthetist_overlaps();
        self.check_buffer_between_rooms();
        self.check_shift_limits();
        self.check_surgery_duration_limit();
        self.compute_metrics_and_utilization();
        Ok(self.build_report())
    }

    fn build_report(mut self) -> ValidationReport {
        self.metrics.num_surgeries = self.surgeries.len();
        self.metrics.num_assignments = self.assignments.len();
        self.metrics.num_violations = self.errors.len();

        let critical_ok = CRITICAL_CHECKS
            .iter()
            .all(|name| *self.checks.get(*name).unwrap_or(&true));
        let has_fatal_error = self
            .errors
            .iter()
            .any(|e| CRITICAL_CHECKS.contains(&e.check.as_str()));

        ValidationReport {
            timestamp: now_iso(),
            valid: critical_ok && !has_fatal_error,
            errors: self.errors,
            warnings: self.warnings,
            metrics: self.metrics,
            checks: self.checks,
        }
    }

    /// Well-formed rows, unique ids, assignment set equals input set,
    /// and untouched surgery timestamps.
    fn check_data_integrity(&mut self) -> Result<(), SchedulerError> {
        let mut ok = true;

        let mut seen: HashSet<&str> = HashSet::new();
        for row in self.assignments {
            if !seen.insert(row.surgery_id.as_str()) {
                ok = false;
                self.add_error(
                    "DataIntegrity",
                    format!("Duplicate surgery_id in assignments: {}", row.surgery_id),
                    json!({ "surgery_id": row.surgery_id }),
                    "Each input surgery must be assigned exactly once",
                );
            }
        }

        let input_ids: HashSet<&str> = self.surgery_by_id.keys().copied().collect();
        let assigned_ids: HashSet<&str> =
            self.assignments.iter().map(|r| r.surgery_id.as_str()).collect();

        let mut missing: Vec<&str> = input_ids.difference(&assigned_ids).copied().collect();
        missing.sort_unstable();
        if !missing.is_empty() {
            ok = false;
            self.add_error(
                "DataIntegrity",
                format!("Missing surgeries in assignments: {:?}", &missing[..missing.len().min(5)]),
                json!({ "missing_count": missing.len() }),
                "Every input surgery must appear in the solution",
            );
        }

        let mut extra: Vec<&str> = assigned_ids.difference(&input_ids).copied().collect();
        extra.sort_unstable();
        if !extra.is_empty() {
            ok = false;
            self.add_error(
                "DataIntegrity",
                format!("Unknown surgeries in assignments: {:?}", &extra[..extra.len().min(5)]),
                json!({ "extra_count": extra.len() }),
                "Remove unknown ids; they must match the input surgeries",
            );
        }

        for row in self.assignments {
            let Some(&source) = self.surgery_by_id.get(row.surgery_id.as_str()) else {
                continue; // already flagged as extra
            };
            if row.start_time != source.start_time || row.end_time != source.end_time {
                ok = false;
                self.add_error(
                    "DataIntegrity",
                    format!(
                        "Assignment times must equal input surgery times for {}",
                        row.surgery_id
                    ),
                    json!({ "surgery_id": row.surgery_id }),
                    "Do not change surgery start/end in the solution",
                );
            }
        }

        self.checks.insert("DataIntegrity".to_string(), ok);

        // corrupted structure aborts the whole validation pipeline
        if self.assignments.is_empty() || input_ids.intersection(&assigned_ids).next().is_none() {
            return Err(SchedulerError::validation(
                "Malformed inputs for validator: empty or non-matching assignments",
                "Validator::check_data_integrity",
                "Verify the solution rows reference known surgery ids.",
            ));
        }
        Ok(())
    }

    /// Surgeries in one room must not overlap.
    fn check_room_overlaps(&mut self) {
        let ok = self.check_group_overlaps("RoomOverlap", |row| row.room_id.as_str());
        self.checks.insert("RoomOverlap".to_string(), ok);
    }

    /// Surgeries of one anesthetist must not overlap.
    fn check_anesthetist_overlaps(&mut self) {
        let ok = self.check_group_overlaps("NoOverlap", |row| row.anesthetist_id.as_str());
        self.checks.insert("NoOverlap".to_string(), ok);
    }

    /// Sweep-per-group overlap detection: sort by start and compare each
    /// row against the longest-running predecessor, which also catches
    /// overlaps spanning several rows.
    fn check_group_overlaps(
        &mut self,
        check: &str,
        key: impl Fn(&SolutionRow) -> &str,
    ) -> bool {
        let mut ok = true;
        for (group, rows) in group_rows(self.assignments, key) {
            let mut running: Option<(&SolutionRow, DateTime<Utc>)> = None;
            for row in rows {
                if let Some((holder, end)) = running {
                    if row.start_time < end {
                        ok = false;
                        self.add_error(
                            check,
                            format!(
                                "Surgeries {} and {} overlap for {group}",
                                holder.surgery_id, row.surgery_id
                            ),
                            json!({
                                "group": group,
                                "surgery_ids": [holder.surgery_id, row.surgery_id],
                            }),
                            "Move one surgery to a different resource",
                        );
                    }
                }
                match running {
                    Some((_, end)) if end >= row.end_time => {}
                    _ => running = Some((row, row.end_time)),
                }
            }
        }
        ok
    }

    /// Advisory: a room change needs at least the configured buffer.
    fn check_buffer_between_rooms(&mut self) {
        let mut ok = true;
        let required_hours = self.cfg.buffer;
        for (anesthetist, rows) in group_rows(self.assignments, |r| r.anesthetist_id.as_str()) {
            for pair in rows.windows(2) {
                let (prev, cur) = (pair[0], pair[1]);
                if prev.room_id == cur.room_id {
                    continue;
                }
                let gap_hours =
                    (cur.start_time - prev.end_time).num_seconds() as f64 / 3600.0;
                if gap_hours < required_hours {
                    ok = false;
                    self.add_error(
                        "Buffer",
                        "Insufficient buffer when switching rooms".to_string(),
                        json!({
                            "anesthetist_id": anesthetist,
                            "surgery_ids": [prev.surgery_id, cur.surgery_id],
                            "gap_hours": round3(gap_hours),
                            "required_hours": required_hours,
                        }),
                        "Increase the gap or keep consecutive surgeries in the same room",
                    );
                }
            }
        }
        self.checks.insert("Buffer".to_string(), ok);
    }

    /// Advisory: spans above `shift_max` are errors; below
    /// `shift_min` only a warning, since short shifts are paid up.
    fn check_shift_limits(&mut self) {
        let mut ok = true;
        for (anesthetist, rows) in group_rows(self.assignments, |r| r.anesthetist_id.as_str()) {
            let span_hours = span_of(&rows);
            if span_hours > self.cfg.shift_max {
                ok = false;
                self.add_error(
                    "ShiftLimits",
                    "Shift duration exceeds maximum limit".to_string(),
                    json!({
                        "anesthetist_id": anesthetist,
                        "duration_hours": round3(span_hours),
                        "limit": self.cfg.shift_max,
                    }),
                    "Reassign or split to keep shifts within the maximum",
                );
            } else if span_hours < self.cfg.shift_min {
                self.add_warning(
                    "ShiftLimits",
                    "Shift shorter than minimum (paid as the minimum)".to_string(),
                    json!({
                        "anesthetist_id": anesthetist,
                        "duration_hours": round3(span_hours),
                        "min_pay_hours": self.cfg.shift_min,
                    }),
                );
            }
        }
        self.checks.insert("ShiftLimits".to_string(), ok);
    }

    /// Individual surgeries longer than `shift_max`, when enforced.
    fn check_surgery_duration_limit(&mut self) {
        if !self.cfg.enforce_surgery_duration_limit {
            self.checks.insert("DurationLimits".to_string(), true);
            return;
        }
        let mut ok = true;
        let limit_hours = self.cfg.shift_max;
        for surgery in self.surgeries {
            let duration = surgery.duration_hours();
            if duration > limit_hours {
                ok = false;
                self.add_error(
                    "DurationLimits",
                    format!(
                        "Surgery {} exceeds maximum allowed duration ({}h > {}h)",
                        surgery.surgery_id,
                        round3(duration),
                        round3(limit_hours)
                    ),
                    json!({
                        "surgery_id": surgery.surgery_id,
                        "duration_hours": duration,
                        "limit_hours": limit_hours,
                    }),
                    "Reject or split surgeries that exceed the maximum duration",
                );
            }
        }
        self.checks.insert("DurationLimits".to_string(), ok);
    }

    /// Piecewise cost, utilization, and resource counters; low
    /// utilization warns but never invalidates.
    fn compute_metrics_and_utilization(&mut self) {
        let total_surgery_hours: f64 = self.surgeries.iter().map(|s| s.duration_hours()).sum();

        let mut total_cost = 0.0;
        let mut rooms_used: HashSet<&str> = HashSet::new();
        let groups = group_rows(self.assignments, |r| r.anesthetist_id.as_str());
        let num_anesthetists = groups.len();
        for (_, rows) in &groups {
            for row in rows {
                rooms_used.insert(row.room_id.as_str());
            }
            total_cost += piecewise_cost_hours(span_of(rows), self.cfg);
        }

        let utilization = if total_cost > 0.0 {
            total_surgery_hours / total_cost
        } else {
            0.0
        };

        self.metrics.total_cost = round6(total_cost);
        self.metrics.utilization = round6(utilization);
        self.metrics.num_anesthetists = num_anesthetists;
        self.metrics.num_rooms_used = rooms_used.len();

        let target = self.cfg.utilization_target;
        if target > 0.0 && utilization < target {
            warn!(utilization, target, "utilization below target");
            self.add_warning(
                "Utilization",
                "Utilization is below target".to_string(),
                json!({ "value": round6(utilization), "target": target }),
            );
            self.checks.insert("Utilization".to_string(), false);
        } else {
            self.checks.insert("Utilization".to_string(), true);
        }
    }

    fn add_error(
        &mut self,
        check: &str,
        message: String,
        entities: serde_json::Value,
        suggested_action: &str,
    ) {
        self.errors.push(ReportEntry {
            check: check.to_string(),
            message,
            entities,
            suggested_action: Some(suggested_action.to_string()),
        });
    }

    fn add_warning(&mut self, check: &str, message: String, entities: serde_json::Value) {
        self.warnings.push(ReportEntry {
            check: check.to_string(),
            message,
            entities,
            suggested_action: None,
        });
    }
}

/// Groups rows by key, each group sorted by start time; groups come out in
/// first-appearance order.
fn group_rows<'r>(
    rows: &'r [SolutionRow],
    key: impl Fn(&SolutionRow) -> &str,
) -> Vec<(String, Vec<&'r SolutionRow>)> {
    let mut groups: Vec<(String, Vec<&SolutionRow>)> = Vec::new();
    for row in rows {
        let k = key(row);
        match groups.iter_mut().find(|(name, _)| name.as_str() == k) {
            Some((_, members)) => members.push(row),
            None => groups.push((k.to_string(), vec![row])),
        }
    }
    for (_, members) in &mut groups {
        members.sort_by_key(|r| (r.start_time, r.end_time));
    }
    groups
}

/// Wall-clock span of one anesthetist's sorted rows, in hours.
fn span_of(rows: &[&SolutionRow]) -> f64 {
    let Some(first) = rows.first() else { return 0.0 };
    let start = rows.iter().map(|r| r.start_time).min().unwrap_or(first.start_time);
    let end = rows.iter().map(|r| r.end_time).max().unwrap_or(first.end_time);
    ((end - start).num_seconds() as f64 / 3600.0).max(0.0)
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn round3(x: f64) -> f64 {
    (x * 1e3).round() / 1e3
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}
