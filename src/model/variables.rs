//! Strongly-typed variable registries for the scheduling model.

use crate::solver::{BoolVar, IntVar};

/// Dense row-major grid of variables, indexed `(row, col)`.
///
/// Rows are surgeries; columns are anesthesiologist slots or rooms.
#[derive(Debug, Clone)]
pub struct Grid2D<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> Grid2D<T> {
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut cells = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                cells.push(f(row, col));
            }
        }
        Self { rows, cols, cells }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> &T {
        debug_assert!(row < self.rows && col < self.cols);
        &self.cells[row * self.cols + col]
    }

    /// One full row as a slice.
    pub fn row(&self, row: usize) -> &[T] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterates one column, top to bottom.
    pub fn column(&self, col: usize) -> impl Iterator<Item = &T> + '_ {
        (0..self.rows).map(move |row| self.get(row, col))
    }
}

/// Per-anesthesiologist decision bundle: activation, workday extent, and
/// the auxiliary cost variables composing the objective.
#[derive(Debug, Clone, Copy)]
pub struct ShiftSlot {
    pub active: BoolVar,
    pub t_min: IntVar,
    pub t_max: IntVar,
    pub duration: IntVar,
    /// Doubled piecewise cost; zero when the slot is inactive.
    pub cost2: IntVar,
    /// Scaled shortfall penalty; absent when `activation_penalty` is zero.
    pub shortfall_cost: Option<IntVar>,
}
