//! Inter-room transition buffer.
//!
//! A dangerous pair is two surgeries whose gap is too small for an
//! anesthesiologist to change rooms. The encoding shares one `sameRoom`
//! Boolean per pair across all anesthesiologist slots, keeping constraint
//! growth at `O(P·(R+A))` instead of `O(P·R·A)`.

use tracing::debug;

use super::variables::Grid2D;
use crate::grid::TickWindow;
use crate::solver::{BoolVar, CpModel};

/// Ordered pair of surgery indices closer than the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DangerousPair {
    pub first: usize,
    pub second: usize,
}

/// Enumerates dangerous pairs once over the whole surgery set.
///
/// `(s1, s2)` qualifies when `end(s1) ≤ start(s2) < end(s1) + buffer`.
pub fn dangerous_pairs(windows: &[TickWindow], buffer_ticks: i64) -> Vec<DangerousPair> {
    let mut pairs = Vec::new();
    for (first, a) in windows.iter().enumerate() {
        for (second, b) in windows.iter().enumerate() {
            if first == second {
                continue;
            }
            if a.end <= b.start && b.start < a.end + buffer_ticks {
                pairs.push(DangerousPair { first, second });
            }
        }
    }
    debug!(pairs = pairs.len(), buffer_ticks, "dangerous pairs enumerated");
    pairs
}

/// Encodes the cross-room rule for every dangerous pair.
///
/// For a pair `(s1, s2)`: `sameRoom ⇔ ∃r: y[s1,r] ∧ y[s2,r]`, and for each
/// slot `a`, `x[s1,a] ∧ x[s2,a] → sameRoom`. An anesthesiologist keeping
/// both surgeries therefore keeps them in one room.
pub(crate) fn encode_buffer_rules(
    model: &mut CpModel,
    x: &Grid2D<BoolVar>,
    y: &Grid2D<BoolVar>,
    pairs: &[DangerousPair],
) {
    for pair in pairs {
        let same_room = model.new_bool_var();

        let mut both_in_room = Vec::with_capacity(y.cols());
        for room in 0..y.cols() {
            let both = model.new_bool_var();
            model.add_and_reif(
                y.get(pair.first, room).lit(),
                y.get(pair.second, room).lit(),
                both,
            );
            both_in_room.push(both);
        }
        model.add_or_reif(&both_in_room, same_room);

        for slot in 0..x.cols() {
            let same_slot = model.new_bool_var();
            model.add_and_reif(
                x.get(pair.first, slot).lit(),
                x.get(pair.second, slot).lit(),
                same_slot,
            );
            model.add_implication(same_slot.lit(), same_room.lit());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: i64, end: i64) -> TickWindow {
        TickWindow { start, end }
    }

    #[test]
    fn gap_inside_buffer_is_dangerous() {
        // gap of 1 tick, buffer of 3
        let windows = vec![window(0, 12), window(13, 24)];
        let pairs = dangerous_pairs(&windows, 3);
        assert_eq!(pairs, vec![DangerousPair { first: 0, second: 1 }]);
    }

    #[test]
    fn back_to_back_is_dangerous() {
        let windows = vec![window(0, 12), window(12, 24)];
        let pairs = dangerous_pairs(&windows, 3);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn gap_at_buffer_is_safe() {
        // gap of exactly 3 ticks with buffer 3: start2 = end1 + 3 is excluded
        let windows = vec![window(0, 12), window(15, 24)];
        assert!(dangerous_pairs(&windows, 3).is_empty());
    }

    #[test]
    fn overlapping_surgeries_are_not_a_dangerous_pair() {
        // overlap is handled by no-overlap constraints, not the buffer
        let windows = vec![window(0, 12), window(6, 18)];
        assert!(dangerous_pairs(&windows, 3).is_empty());
    }

    #[test]
    fn enumeration_is_ordered() {
        let windows = vec![window(20, 30), window(0, 10), window(11, 19)];
        let pairs = dangerous_pairs(&windows, 4);
        // 1 → 2 (gap 1) and 2 → 0 (gap 1)
        assert_eq!(
            pairs,
            vec![
                DangerousPair { first: 1, second: 2 },
                DangerousPair { first: 2, second: 0 },
            ]
        );
    }
}
