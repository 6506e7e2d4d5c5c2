// src/vector_field.rs

use crate::error::{FusionError, Result};
use crate::grid::Grid2D;
use crate::scalar_field::ScalarField2D;

/// 2-component vector field on a 2D grid.
/// Each cell stores (u, v), e.g. the data-term gradient at that cell.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField2D {
    pub grid: Grid2D,
    pub data: Vec<[f32; 2]>,
}

impl VectorField2D {
    /// Create a new zero field on the given grid.
    pub fn new(grid: Grid2D) -> Self {
        Self {
            grid,
            data: vec![[0.0, 0.0]; grid.n_cells()],
        }
    }

    /// Interleave two same-shaped scalar fields into one vector field.
    pub fn from_components(u: &ScalarField2D, v: &ScalarField2D) -> Result<Self> {
        if !u.same_shape(v) {
            return Err(FusionError::ShapeMismatch {
                field: "v component",
                got_nx: v.grid.nx,
                got_ny: v.grid.ny,
                nx: u.grid.nx,
                ny: u.grid.ny,
            });
        }
        let data = u.data.iter().zip(&v.data).map(|(&a, &b)| [a, b]).collect();
        Ok(Self { grid: u.grid, data })
    }

    /// Get the flat index in `data` for grid coordinates (x, y).
    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        self.grid.idx(x, y)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [f32; 2] {
        self.data[self.idx(x, y)]
    }

    /// Split into (u, v) scalar fields.
    pub fn components(&self) -> (ScalarField2D, ScalarField2D) {
        let u = self.data.iter().map(|c| c[0]).collect();
        let v = self.data.iter().map(|c| c[1]).collect();
        (
            ScalarField2D { grid: self.grid, data: u },
            ScalarField2D { grid: self.grid, data: v },
        )
    }

    /// Per-cell Euclidean length.
    pub fn magnitude(&self) -> ScalarField2D {
        ScalarField2D {
            grid: self.grid,
            data: self
                .data
                .iter()
                .map(|c| (c[0] * c[0] + c[1] * c[1]).sqrt())
                .collect(),
        }
    }

    /// Largest per-cell length (0 for an empty field).
    pub fn max_norm(&self) -> f32 {
        self.data
            .iter()
            .map(|c| (c[0] * c[0] + c[1] * c[1]).sqrt())
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_round_trip_through_interleaving() {
        let u = ScalarField2D::from_rows(&[[1.0_f32, 2.0], [3.0, 4.0]]).unwrap();
        let v = ScalarField2D::from_rows(&[[-1.0_f32, -2.0], [-3.0, -4.0]]).unwrap();
        let f = VectorField2D::from_components(&u, &v).unwrap();
        assert_eq!(f.get(1, 1), [4.0, -4.0]);

        let (u2, v2) = f.components();
        assert_eq!(u2, u);
        assert_eq!(v2, v);
    }

    #[test]
    fn from_components_rejects_shape_mismatch() {
        let u = ScalarField2D::new(Grid2D::new(2, 2));
        let v = ScalarField2D::new(Grid2D::new(3, 2));
        assert!(matches!(
            VectorField2D::from_components(&u, &v),
            Err(FusionError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn max_norm_is_largest_length() {
        let mut f = VectorField2D::new(Grid2D::new(2, 1));
        f.data[1] = [3.0, 4.0];
        assert_eq!(f.max_norm(), 5.0);
        assert_eq!(f.magnitude().data, vec![0.0, 5.0]);
    }
}
