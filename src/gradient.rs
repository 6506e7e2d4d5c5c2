// src/gradient.rs
//
// Finite-difference gradient of a scalar field, in grid units.
//
// Interior: central differences (f[i+1] - f[i-1]) / 2.
// Borders:  one-sided first differences.
// An axis with a single cell has zero derivative along it.

use crate::scalar_field::ScalarField2D;

/// Derivative along one axis of a strided 1D line of `n` samples.
#[inline]
fn diff_at(sample: impl Fn(usize) -> f32, i: usize, n: usize) -> f32 {
    if n < 2 {
        0.0
    } else if i == 0 {
        sample(1) - sample(0)
    } else if i == n - 1 {
        sample(n - 1) - sample(n - 2)
    } else {
        0.5 * (sample(i + 1) - sample(i - 1))
    }
}

/// (∂f/∂x, ∂f/∂y) of `field`; x runs along columns, y along rows.
pub fn field_gradient(field: &ScalarField2D) -> (ScalarField2D, ScalarField2D) {
    let grid = field.grid;
    let (nx, ny) = (grid.nx, grid.ny);
    let mut gx = ScalarField2D::new(grid);
    let mut gy = ScalarField2D::new(grid);

    for y in 0..ny {
        for x in 0..nx {
            let idx = grid.idx(x, y);
            gx.data[idx] = diff_at(|i| field.get(i, y), x, nx);
            gy.data[idx] = diff_at(|j| field.get(x, j), y, ny);
        }
    }

    (gx, gy)
}
