//! Integer tick lattice for the scheduling model.
//!
//! All model arithmetic happens on non-negative ticks of `time_unit`
//! hours. The origin sits at UTC midnight of the earliest surgery start,
//! so every converted instant lands at a non-negative tick.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::warn;

use crate::domain::Surgery;

/// Half-open tick interval `[start, end)` occupied by one surgery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickWindow {
    pub start: i64,
    pub end: i64,
}

impl TickWindow {
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    /// True if the two half-open windows share at least one tick.
    pub fn overlaps(&self, other: &TickWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Uniform lattice mapping timezone-aware instants to integer ticks.
#[derive(Debug, Clone)]
pub struct TimeGrid {
    origin: DateTime<Utc>,
    ticks_per_hour: i64,
    horizon: i64,
    buffer_ticks: i64,
}

impl TimeGrid {
    /// Builds the grid and the per-surgery tick windows.
    ///
    /// Surgeries whose converted duration rounds to zero ticks are kept
    /// well-formed by forcing a one-tick duration; the validator still
    /// flags the underlying data problem against the original timestamps.
    pub fn build(time_unit: f64, buffer_hours: f64, surgeries: &[Surgery]) -> (Self, Vec<TickWindow>) {
        let ticks_per_hour = (1.0 / time_unit).round() as i64;

        let origin = surgeries
            .iter()
            .map(|s| s.start_time)
            .min()
            .map(|earliest| earliest.date_naive().and_time(NaiveTime::MIN).and_utc())
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH);

        let mut grid = Self {
            origin,
            ticks_per_hour,
            horizon: 0,
            buffer_ticks: (buffer_hours * ticks_per_hour as f64).round() as i64,
        };

        let mut windows = Vec::with_capacity(surgeries.len());
        for surgery in surgeries {
            let start = grid.to_ticks(surgery.start_time);
            let mut end = grid.to_ticks(surgery.end_time);
            if end <= start {
                warn!(
                    surgery_id = %surgery.surgery_id,
                    start, end,
                    "surgery duration rounds to zero ticks; forcing one tick"
                );
                end = start + 1;
            }
            grid.horizon = grid.horizon.max(end);
            windows.push(TickWindow { start, end });
        }

        (grid, windows)
    }

    /// Converts an instant to its nearest tick on the lattice.
    pub fn to_ticks(&self, instant: DateTime<Utc>) -> i64 {
        let seconds = (instant - self.origin).num_seconds() as f64;
        (seconds / 3600.0 * self.ticks_per_hour as f64).round() as i64
    }

    /// Converts a tick count back to an instant.
    pub fn from_ticks(&self, ticks: i64) -> DateTime<Utc> {
        self.origin + Duration::seconds(ticks * 3600 / self.ticks_per_hour)
    }

    /// Converts a duration in fractional hours to whole ticks.
    pub fn hours_to_ticks(&self, hours: f64) -> i64 {
        (hours * self.ticks_per_hour as f64).round() as i64
    }

    pub fn ticks_per_hour(&self) -> i64 {
        self.ticks_per_hour
    }

    /// One tick past the latest surgery end.
    pub fn horizon(&self) -> i64 {
        self.horizon
    }

    pub fn buffer_ticks(&self) -> i64 {
        self.buffer_ticks
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }
}
