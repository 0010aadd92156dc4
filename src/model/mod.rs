//! Constraint model construction for the scheduling problem.
//!
//! Translates the surgery batch onto the tick lattice: assignment grids,
//! per-resource no-overlap, the inter-room buffer gadget, shift-span
//! linkage, and the piecewise staffing objective. The builder owns every
//! decision variable; the solver only ever sees handles.

mod buffer;
mod variables;

pub use buffer::{dangerous_pairs, DangerousPair};
pub use variables::{Grid2D, ShiftSlot};

use tracing::debug;

use crate::config::Config;
use crate::domain::Surgery;
use crate::error::SchedulerError;
use crate::grid::{TickWindow, TimeGrid};
use crate::solver::{BoolVar, CpModel, IntVar, OptionalInterval};

/// Model plus the typed handles needed for extraction.
#[derive(Debug, Clone)]
pub struct BuiltModel {
    pub model: CpModel,
    /// `x[s,a]`: anesthesiologist slot `a` takes surgery `s`.
    pub x: Grid2D<BoolVar>,
    /// `y[s,r]`: room `r` holds surgery `s`.
    pub y: Grid2D<BoolVar>,
    pub slots: Vec<ShiftSlot>,
    pub grid: TimeGrid,
    pub windows: Vec<TickWindow>,
}

/// Builds the constraint model from validated inputs.
pub struct ModelBuilder<'a> {
    cfg: &'a Config,
    surgeries: &'a [Surgery],
}

impl<'a> ModelBuilder<'a> {
    pub fn new(cfg: &'a Config, surgeries: &'a [Surgery]) -> Self {
        Self { cfg, surgeries }
    }

    pub fn build(&self) -> Result<BuiltModel, SchedulerError> {
        let (grid, windows) = TimeGrid::build(self.cfg.time_unit, self.cfg.buffer, self.surgeries);
        let num_surgeries = self.surgeries.len();
        // the solver chooses how many anesthesiologists to activate,
        // bounded above by the number of surgeries
        let num_slots = num_surgeries;
        let num_rooms = self.cfg.rooms_max;

        let mut model = CpModel::new();
        let x = Grid2D::from_fn(num_surgeries, num_slots, |_, _| model.new_bool_var());
        let y = Grid2D::from_fn(num_surgeries, num_rooms, |_, _| model.new_bool_var());

        // branch surgery by surgery, in the loader's chronological order
        for s in 0..num_surgeries {
            for &var in x.row(s) {
                model.add_decision(var);
            }
            for &var in y.row(s) {
                model.add_decision(var);
            }
        }

        for s in 0..num_surgeries {
            model.add_exactly_one(x.row(s));
            model.add_exactly_one(y.row(s));
        }

        self.add_resource_no_overlap(&mut model, &x, &windows);
        self.add_resource_no_overlap(&mut model, &y, &windows);

        let pairs = dangerous_pairs(&windows, grid.buffer_ticks());
        buffer::encode_buffer_rules(&mut model, &x, &y, &pairs);

        let mut objective: Vec<(i64, IntVar)> = Vec::new();
        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            let shift = self.build_shift_slot(&mut model, &grid, &windows, &x, slot);
            objective.push((1, shift.cost2));
            if let Some(penalty) = shift.shortfall_cost {
                objective.push((1, penalty));
            }
            slots.push(shift);
        }

        let activation_coeff = self.cfg.activation_penalty.round() as i64;
        if self.cfg.activation_penalty > 0.0 && activation_coeff > 0 {
            for shift in &slots {
                objective.push((activation_coeff, shift.active.int()));
            }
            for room in 0..num_rooms {
                let used = model.new_bool_var();
                let column: Vec<BoolVar> = y.column(room).copied().collect();
                if !column.is_empty() {
                    model.add_or_reif(&column, used);
                    objective.push((activation_coeff, used.int()));
                }
            }
        }
        model.minimize(objective);

        debug!(
            surgeries = num_surgeries,
            slots = num_slots,
            rooms = num_rooms,
            dangerous_pairs = pairs.len(),
            vars = model.num_vars(),
            constraints = model.num_constraints(),
            "model built"
        );

        if let Some(reason) = model.invalid.clone() {
            return Err(SchedulerError::model(
                format!("inconsistent model construction: {reason}"),
                "ModelBuilder::build",
                "This indicates corrupted intermediate state; check input validation.",
            ));
        }

        Ok(BuiltModel {
            model,
            x,
            y,
            slots,
            grid,
            windows,
        })
    }

    /// One optional interval per `(surgery, column)` sharing the fixed base
    /// window, gated by the assignment Boolean; one no-overlap per column.
    fn add_resource_no_overlap(
        &self,
        model: &mut CpModel,
        assignment: &Grid2D<BoolVar>,
        windows: &[TickWindow],
    ) {
        for col in 0..assignment.cols() {
            let intervals: Vec<OptionalInterval> = windows
                .iter()
                .enumerate()
                .map(|(s, &window)| OptionalInterval {
                    window,
                    presence: *assignment.get(s, col),
                })
                .collect();
            model.add_no_overlap(&intervals);
        }
    }

    /// Activation, span linkage, and cost composition for one slot.
    fn build_shift_slot(
        &self,
        model: &mut CpModel,
        grid: &TimeGrid,
        windows: &[TickWindow],
        x: &Grid2D<BoolVar>,
        slot: usize,
    ) -> ShiftSlot {
        let horizon = grid.horizon();
        let shift_min = grid.hours_to_ticks(self.cfg.shift_min);
        let shift_max = grid.hours_to_ticks(self.cfg.shift_max);
        let overtime_from = grid.hours_to_ticks(self.cfg.shift_overtime);

        let column: Vec<BoolVar> = x.column(slot).copied().collect();
        let active = model.new_bool_var();
        model.add_or_reif(&column, active);

        // Proxies keep the min/max equalities unconditional: an unassigned
        // surgery contributes `horizon` to the min and 0 to the max, so it
        // can never drag the span outward.
        let mut start_proxies = Vec::with_capacity(windows.len());
        let mut end_proxies = Vec::with_capacity(windows.len());
        for (s, window) in windows.iter().enumerate() {
            let assigned = *x.get(s, slot);
            let start_proxy = model.new_int_var(0, horizon);
            model.add_eq_const_if(assigned.lit(), start_proxy, window.start);
            model.add_eq_const_if(assigned.negated(), start_proxy, horizon);
            start_proxies.push(start_proxy);

            let end_proxy = model.new_int_var(0, horizon);
            model.add_eq_const_if(assigned.lit(), end_proxy, window.end);
            model.add_eq_const_if(assigned.negated(), end_proxy, 0);
            end_proxies.push(end_proxy);
        }

        let t_min_active = model.new_int_var(0, horizon);
        let t_max_active = model.new_int_var(0, horizon);
        model.add_min_eq(t_min_active, &start_proxies);
        model.add_max_eq(t_max_active, &end_proxies);

        let t_min = model.new_int_var(0, horizon);
        let t_max = model.new_int_var(0, horizon);
        model.add_eq_if(active.lit(), t_min, t_min_active);
        model.add_eq_if(active.lit(), t_max, t_max_active);
        model.add_eq_const_if(active.negated(), t_min, 0);
        model.add_eq_const_if(active.negated(), t_max, 0);
        model.add_diff_le_if(active.lit(), t_max, t_min, shift_max);

        let duration = model.new_int_var(0, horizon);
        model.add_linear_eq(duration, &[(1, t_max), (-1, t_min)], 0);

        // base = max(duration, shift_min), scaled ×2 to keep the 1.5×
        // overtime multiplier integral
        let base_ub = horizon.max(shift_min);
        let base = model.new_int_var(shift_min, base_ub);
        let shift_min_const = model.new_constant(shift_min);
        model.add_max_eq(base, &[duration, shift_min_const]);

        let over_ub = (horizon - overtime_from).max(0);
        let past_overtime = model.new_int_var(-overtime_from, horizon - overtime_from);
        model.add_linear_eq(past_overtime, &[(1, duration)], -overtime_from);
        let overtime = model.new_int_var(0, over_ub);
        let zero = model.new_constant(0);
        model.add_max_eq(overtime, &[past_overtime, zero]);

        let overtime_coeff = (2.0 * (self.cfg.overtime_multiplier - 1.0)).round() as i64;
        let cost_ub = 2 * base_ub + overtime_coeff * over_ub;
        let cost_expr = model.new_int_var(2 * shift_min, cost_ub);
        model.add_linear_eq(cost_expr, &[(2, base), (overtime_coeff, overtime)], 0);

        let cost2 = model.new_int_var(0, cost_ub);
        model.add_eq_if(active.lit(), cost2, cost_expr);
        model.add_eq_const_if(active.negated(), cost2, 0);

        let shortfall_coeff =
            (self.cfg.activation_penalty * grid.ticks_per_hour() as f64).round() as i64;
        let shortfall_cost = (shortfall_coeff > 0).then(|| {
            let below_min = model.new_int_var(shift_min - horizon, shift_min);
            model.add_linear_eq(below_min, &[(-1, duration)], shift_min);
            let shortfall = model.new_int_var(0, shift_min);
            model.add_max_eq(shortfall, &[below_min, zero]);

            let penalty_ub = shortfall_coeff * shift_min;
            let penalty_expr = model.new_int_var(0, penalty_ub);
            model.add_linear_eq(penalty_expr, &[(shortfall_coeff, shortfall)], 0);
            let penalty = model.new_int_var(0, penalty_ub);
            model.add_eq_if(active.lit(), penalty, penalty_expr);
            model.add_eq_const_if(active.negated(), penalty, 0);
            penalty
        });

        ShiftSlot {
            active,
            t_min,
            t_max,
            duration,
            cost2,
            shortfall_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverParams;
    use crate::solver::{SolveStatus, SolverDriver};

    fn surgery(id: &str, start: &str, end: &str) -> Surgery {
        Surgery {
            surgery_id: id.to_string(),
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
        }
    }

    fn test_config(rooms_max: usize) -> Config {
        Config {
            rooms_max,
            solver: SolverParams {
                num_workers: 1,
                ..SolverParams::default()
            },
            ..Config::default()
        }
    }

    fn solve(built: &BuiltModel, cfg: &Config) -> crate::solver::SolveOutcome {
        SolverDriver::new(cfg.solver.clone()).solve(&built.model)
    }

    #[test]
    fn decision_count_covers_both_grids() {
        let cfg = test_config(2);
        let surgeries = vec![
            surgery("s1", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z"),
            surgery("s2", "2025-01-01T10:00:00Z", "2025-01-01T11:00:00Z"),
        ];
        let built = ModelBuilder::new(&cfg, &surgeries).build().unwrap();
        // per surgery: S slot booleans + rooms_max room booleans
        assert_eq!(built.model.decisions.len(), 2 * (2 + 2));
        assert_eq!(built.slots.len(), 2);
    }

    #[test]
    fn single_anesthetist_covers_a_loose_day() {
        let cfg = test_config(2);
        let surgeries = vec![
            surgery("s1", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z"),
            surgery("s2", "2025-01-01T09:10:00Z", "2025-01-01T10:00:00Z"),
        ];
        let built = ModelBuilder::new(&cfg, &surgeries).build().unwrap();
        let outcome = solve(&built, &cfg);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        // shift below minimum pays 2 × shift_min × ticks_per_hour
        assert_eq!(outcome.objective, Some(120));

        let values = outcome.values.unwrap();
        let active: usize = built
            .slots
            .iter()
            .filter(|s| values.bool_value(s.active))
            .count();
        assert_eq!(active, 1);
    }

    #[test]
    fn overlap_forces_two_anesthetists_and_rooms() {
        let cfg = test_config(2);
        let surgeries = vec![
            surgery("s1", "2025-01-01T08:00:00Z", "2025-01-01T10:00:00Z"),
            surgery("s2", "2025-01-01T09:00:00Z", "2025-01-01T11:00:00Z"),
        ];
        let built = ModelBuilder::new(&cfg, &surgeries).build().unwrap();
        let outcome = solve(&built, &cfg);
        assert_eq!(outcome.status, SolveStatus::Optimal);

        let values = outcome.values.unwrap();
        let active: usize = built
            .slots
            .iter()
            .filter(|s| values.bool_value(s.active))
            .count();
        assert_eq!(active, 2);

        // both rooms hold exactly one surgery
        for s in 0..2 {
            let room: Vec<bool> = (0..2)
                .map(|r| values.bool_value(*built.y.get(s, r)))
                .collect();
            assert_eq!(room.iter().filter(|&&b| b).count(), 1);
        }
        let room_of = |s: usize| (0..2).find(|&r| values.bool_value(*built.y.get(s, r)));
        assert_ne!(room_of(0), room_of(1));
    }

    #[test]
    fn dangerous_pair_shares_a_room_under_one_anesthetist() {
        let cfg = test_config(2);
        let surgeries = vec![
            surgery("s1", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z"),
            surgery("s2", "2025-01-01T09:05:00Z", "2025-01-01T10:00:00Z"),
        ];
        let built = ModelBuilder::new(&cfg, &surgeries).build().unwrap();
        assert_eq!(dangerous_pairs(&built.windows, built.grid.buffer_ticks()).len(), 1);

        let outcome = solve(&built, &cfg);
        let values = outcome.values.unwrap();

        let slot_of = |s: usize| (0..2).find(|&a| values.bool_value(*built.x.get(s, a)));
        let room_of = |s: usize| (0..2).find(|&r| values.bool_value(*built.y.get(s, r)));
        // one anesthetist is cheapest, and must then keep one room
        assert_eq!(slot_of(0), slot_of(1));
        assert_eq!(room_of(0), room_of(1));
    }

    #[test]
    fn span_past_shift_max_splits_the_day() {
        let cfg = test_config(2);
        let surgeries = vec![
            surgery("s1", "2025-01-01T07:00:00Z", "2025-01-01T08:00:00Z"),
            surgery("s2", "2025-01-01T19:00:00Z", "2025-01-01T20:00:00Z"),
        ];
        let built = ModelBuilder::new(&cfg, &surgeries).build().unwrap();
        let outcome = solve(&built, &cfg);
        assert_eq!(outcome.status, SolveStatus::Optimal);

        let values = outcome.values.unwrap();
        let active: usize = built
            .slots
            .iter()
            .filter(|s| values.bool_value(s.active))
            .count();
        assert_eq!(active, 2, "13h span must not fit one 12h shift");
        assert_eq!(outcome.objective, Some(240));
    }

    #[test]
    fn one_room_for_simultaneous_surgeries_is_infeasible() {
        let cfg = test_config(1);
        let surgeries = vec![
            surgery("s1", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z"),
            surgery("s2", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z"),
        ];
        let built = ModelBuilder::new(&cfg, &surgeries).build().unwrap();
        let outcome = solve(&built, &cfg);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
    }

    #[test]
    fn activation_penalty_adds_room_and_slot_terms() {
        let mut cfg = test_config(2);
        cfg.activation_penalty = 10.0;
        let surgeries = vec![surgery("s1", "2025-01-01T08:00:00Z", "2025-01-01T09:00:00Z")];
        let built = ModelBuilder::new(&cfg, &surgeries).build().unwrap();
        let outcome = solve(&built, &cfg);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        // cost2 = 120; shortfall = 60 − 12 = 48 ticks at coeff 120;
        // activation 10 for the slot + 10 for the room
        assert_eq!(outcome.objective, Some(120 + 48 * 120 + 10 + 10));
    }
}
