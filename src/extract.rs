//! Post-solve materialization of the canonical schedule.
//!
//! Reads the winning assignment, renames anesthesiologist slots to
//! sequential ids in order of each slot's first surgery start, and emits
//! schedule rows sorted chronologically.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::Surgery;
use crate::error::SchedulerError;
use crate::model::BuiltModel;
use crate::solver::SolvedValues;
use crate::Id;

/// One record of `solution.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolutionRow {
    pub surgery_id: Id,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub anesthetist_id: Id,
    pub room_id: Id,
}

/// Extracts canonical schedule rows from a feasible solve.
///
/// Slot indices are renamed `A001, A002, …` by first-surgery start;
/// ties on identical starts break by the original slot index. Rooms keep
/// their model index as `R<index>`.
pub fn extract_assignments(
    built: &BuiltModel,
    values: &SolvedValues,
    surgeries: &[Surgery],
) -> Result<Vec<SolutionRow>, SchedulerError> {
    let mut assignments = Vec::with_capacity(surgeries.len());
    for (s, surgery) in surgeries.iter().enumerate() {
        let slot = (0..built.x.cols()).find(|&a| values.bool_value(*built.x.get(s, a)));
        let room = (0..built.y.cols()).find(|&r| values.bool_value(*built.y.get(s, r)));
        match (slot, room) {
            (Some(slot), Some(room)) => assignments.push((s, surgery, slot, room)),
            _ => {
                return Err(SchedulerError::solve(
                    format!(
                        "surgery {} has no assigned anesthesiologist/room in a feasible solution",
                        surgery.surgery_id
                    ),
                    "extract_assignments",
                    "Extract assignments only from OPTIMAL or FEASIBLE solves.",
                ))
            }
        }
    }

    assignments.sort_by(|a, b| (a.1.start_time, a.2).cmp(&(b.1.start_time, b.2)));

    let mut slot_rank: Vec<(usize, usize)> = Vec::new(); // (slot, rank)
    for &(_, _, slot, _) in &assignments {
        if !slot_rank.iter().any(|&(known, _)| known == slot) {
            let rank = slot_rank.len();
            slot_rank.push((slot, rank));
        }
    }

    let label_of = |slot: usize| -> Id {
        let rank = slot_rank
            .iter()
            .find(|&&(known, _)| known == slot)
            .map(|&(_, rank)| rank)
            .unwrap_or(0);
        format!("A{:03}", rank + 1)
    };

    Ok(assignments
        .into_iter()
        .map(|(_, surgery, slot, room)| SolutionRow {
            surgery_id: surgery.surgery_id.clone(),
            start_time: surgery.start_time,
            end_time: surgery.end_time,
            anesthetist_id: label_of(slot),
            room_id: format!("R{room}"),
        })
        .collect())
}
