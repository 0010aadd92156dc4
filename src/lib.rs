//! opsched - OPerating-theatre Scheduling via Constraint-based Exact Deduction
//!
//! Schedules a batch of surgeries with fixed start/end times by assigning
//! each surgery to an anesthesiologist and an operating room, minimizing a
//! piecewise-linear staffing cost under overlap, inter-room buffer, and
//! shift-span constraints.

pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod extract;
pub mod grid;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod solver;
pub mod validator;

/// Identifier type used for surgeries, anesthetists, and rooms.
pub type Id = String;
