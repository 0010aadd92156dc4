//! Immutable input domain: the surgery batch under scheduling.

use chrono::{DateTime, Utc};

use crate::Id;

mod loader;

pub use loader::{LoadIssue, LoadIssueKind, LoadResult, SurgeriesLoader};

/// One surgery with fixed, already-known start and end instants.
///
/// Constructed once by the loader and treated as read-only by every
/// downstream component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surgery {
    pub surgery_id: Id,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Surgery {
    /// Duration in fractional hours.
    pub fn duration_hours(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 3600.0
    }
}
