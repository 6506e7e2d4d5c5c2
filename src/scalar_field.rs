// src/scalar_field.rs

use crate::error::{FusionError, Result};
use crate::grid::Grid2D;

/// Dense `f32` field on a 2D grid (an SDF, TSDF or one gradient component).
///
/// Addressed as (x, y) = (column, row). Callers own fields; every data-term
/// operation only borrows them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField2D {
    pub grid: Grid2D,
    pub data: Vec<f32>,
}

impl ScalarField2D {
    /// Zero-initialised field.
    pub fn new(grid: Grid2D) -> Self {
        Self::filled(grid, 0.0)
    }

    pub fn filled(grid: Grid2D, value: f32) -> Self {
        Self {
            grid,
            data: vec![value; grid.n_cells()],
        }
    }

    /// Build from rows (outer index = y). Rows must be non-empty and equally long.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let ny = rows.len();
        let nx = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if ny == 0 || nx == 0 {
            return Err(FusionError::EmptyField);
        }
        let mut data = Vec::with_capacity(nx * ny);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != nx {
                return Err(FusionError::invalid(
                    "rows",
                    format!("row {} has {} values, expected {}", y, row.len(), nx),
                ));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            grid: Grid2D::new(nx, ny),
            data,
        })
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        self.grid.idx(x, y)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.idx(x, y)]
    }

    /// Bounds-checked read for signed coordinates.
    #[inline]
    pub fn try_get(&self, x: i64, y: i64) -> Option<f32> {
        if self.grid.contains(x, y) {
            Some(self.get(x as usize, y as usize))
        } else {
            None
        }
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        let idx = self.idx(x, y);
        self.data[idx] = value;
    }

    pub fn same_shape(&self, other: &ScalarField2D) -> bool {
        self.grid == other.grid
    }

    /// One row (fixed y) as a slice.
    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.grid.nx;
        &self.data[start..start + self.grid.nx]
    }

    /// Min / max over finite values; `None` if there are none.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &v in self.data.iter().filter(|v| v.is_finite()) {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo.is_finite() && hi.is_finite() {
            Some((lo, hi))
        } else {
            None
        }
    }
}
