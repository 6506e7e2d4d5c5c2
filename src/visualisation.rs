// src/visualisation.rs
//
// PNG heat maps of fields. Plots carry no text so they render without a
// system font stack.

use plotters::prelude::*;
use std::path::Path;

use crate::error::{FusionError, Result};
use crate::scalar_field::ScalarField2D;
use crate::vector_field::VectorField2D;

/// Pixels per cell edge, capped so large grids stay a sensible size.
fn cell_pixels(n: usize) -> u32 {
    ((800 / n.max(1)) as u32).clamp(1, 16)
}

/// Map a value to a blue–white–red colour over [lo, hi].
///
/// lo maps to blue, hi maps to red, midpoint to white.
fn value_to_color(v: f32, lo: f32, hi: f32) -> RGBColor {
    // Protect against lo ≈ hi (e.g. a constant field)
    let (lo, hi) = if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-9 {
        (-1.0, 1.0)
    } else {
        (lo, hi)
    };
    if !v.is_finite() {
        return RGBColor(0, 0, 0);
    }

    let x = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    let r = (255.0 * x) as u8;
    let b = (255.0 * (1.0 - x)) as u8;
    let g = (255.0 * (1.0 - (2.0 * (x - 0.5).abs()))).clamp(0.0, 255.0) as u8;
    RGBColor(r, g, b)
}

fn plot_err<E: std::fmt::Display>(e: E) -> FusionError {
    FusionError::Plot(e.to_string())
}

/// Save a scalar field as a heat map.
///
/// `range` fixes the colour scale (e.g. `(-1, 1)` for TSDFs); `None` uses the
/// field's own finite min/max so small variations stay visible.
/// Row 0 is drawn at the top, matching how fields are printed.
pub fn save_scalar_field_plot(
    field: &ScalarField2D,
    path: &Path,
    range: Option<(f32, f32)>,
) -> Result<()> {
    let nx = field.grid.nx;
    let ny = field.grid.ny;
    if nx == 0 || ny == 0 {
        return Err(FusionError::EmptyField);
    }
    let (lo, hi) = range.or_else(|| field.min_max()).unwrap_or((-1.0, 1.0));

    let px = cell_pixels(nx.max(ny));
    let size = (nx as u32 * px, ny as u32 * px);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .build_cartesian_2d(0..nx as i32, 0..ny as i32)
        .map_err(plot_err)?;

    // One coloured rectangle per cell
    chart
        .draw_series((0..ny).flat_map(|y| {
            (0..nx).map(move |x| {
                let color = value_to_color(field.get(x, y), lo, hi);
                let yp = (ny - 1 - y) as i32;
                Rectangle::new(
                    [(x as i32, yp), (x as i32 + 1, yp + 1)],
                    color.filled(),
                )
            })
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Heat map of per-cell vector length (e.g. the data-term gradient).
pub fn save_vector_magnitude_plot(field: &VectorField2D, path: &Path) -> Result<()> {
    let mag = field.magnitude();
    let hi = mag.min_max().map_or(1.0, |(_, hi)| hi);
    save_scalar_field_plot(&mag, path, Some((0.0, hi)))
}
