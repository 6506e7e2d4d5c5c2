// src/data_term.rs
//
// KillingFusion / SobolevFusion data term on a 2D grid.
//
// At a cell (x, y) with difference d = live(x,y) - canonical(x,y):
//   gradient = d * (∂live/∂x, ∂live/∂y) * k
//   energy   = 0.5 * d^2
//
// References: KillingFusion (Slavcheva et al., CVPR 2017) sec. 4.1,
// SobolevFusion (Slavcheva et al., CVPR 2018) sec. 4.1.
//
// Everything here only borrows its inputs, so cells can be evaluated from any
// number of threads at once; `compute_data_term` does exactly that with Rayon.

use log::debug;
use rayon::prelude::*;

use crate::error::{FusionError, Result};
use crate::grid::Grid2D;
use crate::params::DataTermParams;
use crate::scalar_field::ScalarField2D;
use crate::vector_field::VectorField2D;

/// Data-term gradient and energy at one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataTermResult {
    /// (u, v) components of the data-term gradient.
    pub gradient: [f32; 2],
    /// Contribution of this cell to the data energy.
    pub energy: f32,
}

/// Pointwise data term, no bounds or shape checks.
///
/// This is the kernel the checked entry points reduce to once the location is
/// known to be valid.
#[inline]
pub fn data_term_from_samples(
    live_sdf: f32,
    canonical_sdf: f32,
    live_gradient: [f32; 2],
    scaling_factor: f32,
) -> DataTermResult {
    let difference = live_sdf - canonical_sdf;
    DataTermResult {
        gradient: [
            difference * live_gradient[0] * scaling_factor,
            difference * live_gradient[1] * scaling_factor,
        ],
        energy: 0.5 * difference * difference,
    }
}

fn check_location(field: &ScalarField2D, name: &'static str, x: i64, y: i64) -> Result<()> {
    check_storage(name, field)?;
    if field.grid.contains(x, y) {
        Ok(())
    } else {
        Err(FusionError::OutOfBounds {
            field: name,
            x,
            y,
            nx: field.grid.nx,
            ny: field.grid.ny,
        })
    }
}

/// Data term at location (x, y).
///
/// - `warped_live_field`: live SDF warped by the current motion estimate
/// - `canonical_field`: canonical SDF
/// - `live_gradient_x_field` / `live_gradient_y_field`: precomputed gradient of the warped live field
///
/// (x, y) must address a cell of every field; otherwise the first field it
/// misses is reported in `FusionError::OutOfBounds`. The fields need not share
/// a shape for this single lookup. A non-finite scaling factor is rejected.
pub fn data_term_at_location(
    warped_live_field: &ScalarField2D,
    canonical_field: &ScalarField2D,
    x: i64,
    y: i64,
    live_gradient_x_field: &ScalarField2D,
    live_gradient_y_field: &ScalarField2D,
    params: &DataTermParams,
) -> Result<DataTermResult> {
    params.validate()?;
    check_location(warped_live_field, "warped live", x, y)?;
    check_location(canonical_field, "canonical", x, y)?;
    check_location(live_gradient_x_field, "live gradient x", x, y)?;
    check_location(live_gradient_y_field, "live gradient y", x, y)?;

    let (xu, yu) = (x as usize, y as usize);
    Ok(data_term_from_samples(
        warped_live_field.get(xu, yu),
        canonical_field.get(xu, yu),
        [
            live_gradient_x_field.get(xu, yu),
            live_gradient_y_field.get(xu, yu),
        ],
        params.scaling_factor,
    ))
}

/// The four fields the data term reads, checked once to share a shape.
///
/// Only [`DataTermInputs::new`] builds one, so a value of this type always
/// holds four equally-shaped, non-empty fields.
#[derive(Debug, Clone, Copy)]
pub struct DataTermInputs<'a> {
    warped_live: &'a ScalarField2D,
    canonical: &'a ScalarField2D,
    live_gradient_x: &'a ScalarField2D,
    live_gradient_y: &'a ScalarField2D,
}

fn check_storage(name: &'static str, f: &ScalarField2D) -> Result<()> {
    if f.data.len() != f.grid.n_cells() {
        return Err(FusionError::invalid(
            name,
            format!(
                "holds {} values for a {} x {} grid",
                f.data.len(),
                f.grid.nx,
                f.grid.ny
            ),
        ));
    }
    Ok(())
}

fn check_shapes(
    warped_live: &ScalarField2D,
    canonical: &ScalarField2D,
    live_gradient_x: &ScalarField2D,
    live_gradient_y: &ScalarField2D,
) -> Result<()> {
    let grid = warped_live.grid;
    if grid.is_empty() {
        return Err(FusionError::EmptyField);
    }
    check_storage("warped live", warped_live)?;
    for (name, f) in [
        ("canonical", canonical),
        ("live gradient x", live_gradient_x),
        ("live gradient y", live_gradient_y),
    ] {
        if f.grid != grid {
            return Err(FusionError::ShapeMismatch {
                field: name,
                got_nx: f.grid.nx,
                got_ny: f.grid.ny,
                nx: grid.nx,
                ny: grid.ny,
            });
        }
        check_storage(name, f)?;
    }
    Ok(())
}

impl<'a> DataTermInputs<'a> {
    pub fn new(
        warped_live: &'a ScalarField2D,
        canonical: &'a ScalarField2D,
        live_gradient_x: &'a ScalarField2D,
        live_gradient_y: &'a ScalarField2D,
    ) -> Result<Self> {
        check_shapes(warped_live, canonical, live_gradient_x, live_gradient_y)?;
        Ok(Self {
            warped_live,
            canonical,
            live_gradient_x,
            live_gradient_y,
        })
    }

    pub fn warped_live(&self) -> &'a ScalarField2D {
        self.warped_live
    }

    pub fn canonical(&self) -> &'a ScalarField2D {
        self.canonical
    }

    pub fn live_gradient_x(&self) -> &'a ScalarField2D {
        self.live_gradient_x
    }

    pub fn live_gradient_y(&self) -> &'a ScalarField2D {
        self.live_gradient_y
    }

    pub fn grid(&self) -> Grid2D {
        self.warped_live.grid
    }

    /// Checked single-cell evaluation.
    pub fn at(&self, x: i64, y: i64, params: &DataTermParams) -> Result<DataTermResult> {
        data_term_at_location(
            self.warped_live,
            self.canonical,
            x,
            y,
            self.live_gradient_x,
            self.live_gradient_y,
            params,
        )
    }

    #[inline]
    fn at_flat(&self, idx: usize, scaling_factor: f32) -> DataTermResult {
        data_term_from_samples(
            self.warped_live.data[idx],
            self.canonical.data[idx],
            [self.live_gradient_x.data[idx], self.live_gradient_y.data[idx]],
            scaling_factor,
        )
    }
}

/// Data term over a whole grid.
#[derive(Debug, Clone)]
pub struct DataTermField {
    pub gradient: VectorField2D,
    pub energy: ScalarField2D,
    /// Sum of per-cell energies, accumulated in f64.
    pub total_energy: f64,
}

/// Evaluate the data term at every cell.
///
/// Rows are summed individually and the row sums added in order, so the
/// parallel and serial passes produce bit-identical totals.
pub fn compute_data_term(
    inputs: &DataTermInputs<'_>,
    params: &DataTermParams,
    parallel: bool,
) -> Result<DataTermField> {
    params.validate()?;
    check_shapes(
        inputs.warped_live,
        inputs.canonical,
        inputs.live_gradient_x,
        inputs.live_gradient_y,
    )?;
    let grid = inputs.grid();
    let nx = grid.nx;
    let k = params.scaling_factor;

    let mut gradient = VectorField2D::new(grid);
    let mut energy = ScalarField2D::new(grid);
    let mut row_energy = vec![0.0_f64; grid.ny];

    let eval_row = |y: usize, g_row: &mut [[f32; 2]], e_row: &mut [f32]| -> f64 {
        let mut sum = 0.0_f64;
        for x in 0..nx {
            let r = inputs.at_flat(y * nx + x, k);
            g_row[x] = r.gradient;
            e_row[x] = r.energy;
            sum += r.energy as f64;
        }
        sum
    };

    if parallel {
        gradient
            .data
            .par_chunks_mut(nx)
            .zip(energy.data.par_chunks_mut(nx))
            .zip(row_energy.par_iter_mut())
            .enumerate()
            .for_each(|(y, ((g_row, e_row), slot))| {
                *slot = eval_row(y, g_row, e_row);
            });
    } else {
        for (y, ((g_row, e_row), slot)) in gradient
            .data
            .chunks_mut(nx)
            .zip(energy.data.chunks_mut(nx))
            .zip(row_energy.iter_mut())
            .enumerate()
        {
            *slot = eval_row(y, g_row, e_row);
        }
    }

    let total_energy: f64 = row_energy.iter().sum();
    debug!(
        "[data_term] {}x{} cells, parallel={}, total energy {:.6e}",
        grid.nx, grid.ny, parallel, total_energy
    );

    Ok(DataTermField {
        gradient,
        energy,
        total_energy,
    })
}
