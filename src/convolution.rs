// src/convolution.rs
//
// Sobolev-space smoothing of a 2D vector field (SobolevFusion sec. 3).
// Both components are convolved with a 1D kernel along y, then along x,
// with zero padding and output aligned to the input ("same" mode).

use log::debug;

use crate::error::{FusionError, Result};
use crate::vector_field::VectorField2D;

/// 7-tap Sobolev kernel used by the 2D fusion experiments.
pub const SOBOLEV_KERNEL_1D: [f32; 7] = [
    2.995_900_3e-4,
    4.410_949_5e-3,
    6.571_319e-2,
    9.956_528e-1,
    6.571_319e-2,
    4.410_949_5e-3,
    2.995_900_3e-4,
];

/// Values with magnitude below this count as zero for the preserving variant.
const ZERO_EPS: f32 = 1e-6;

fn check_kernel(kernel: &[f32]) -> Result<()> {
    if kernel.is_empty() || kernel.len() % 2 == 0 {
        return Err(FusionError::invalid(
            "kernel",
            format!("length must be odd, got {}", kernel.len()),
        ));
    }
    Ok(())
}

/// "same"-mode 1D convolution of a strided line.
/// `read(i)` yields sample i of `n`; result is written through `write`.
fn convolve_line(
    n: usize,
    kernel: &[f32],
    read: impl Fn(usize) -> [f32; 2],
    mut write: impl FnMut(usize, [f32; 2]),
) {
    let half = (kernel.len() / 2) as isize;
    for i in 0..n {
        let mut acc = [0.0_f32; 2];
        for (k, &w) in kernel.iter().enumerate() {
            let src = i as isize + half - k as isize;
            if src < 0 || src >= n as isize {
                continue;
            }
            let v = read(src as usize);
            acc[0] += w * v[0];
            acc[1] += w * v[1];
        }
        write(i, acc);
    }
}

fn convolve_y(field: &VectorField2D, kernel: &[f32]) -> VectorField2D {
    let grid = field.grid;
    let mut out = VectorField2D::new(grid);
    for x in 0..grid.nx {
        convolve_line(
            grid.ny,
            kernel,
            |y| field.get(x, y),
            |y, v| {
                let idx = grid.idx(x, y);
                out.data[idx] = v;
            },
        );
    }
    out
}

fn convolve_x(field: &VectorField2D, kernel: &[f32]) -> VectorField2D {
    let grid = field.grid;
    let mut out = VectorField2D::new(grid);
    for y in 0..grid.ny {
        convolve_line(
            grid.nx,
            kernel,
            |x| field.get(x, y),
            |x, v| {
                let idx = grid.idx(x, y);
                out.data[idx] = v;
            },
        );
    }
    out
}

/// Convolve `field` in place with `kernel` along y then x.
pub fn convolve_with_kernel(field: &mut VectorField2D, kernel: &[f32]) -> Result<()> {
    check_kernel(kernel)?;
    let y_convolved = convolve_y(field, kernel);
    *field = convolve_x(&y_convolved, kernel);
    debug!(
        "[sobolev] smoothed {}x{} field, max |g| = {:.4e}",
        field.grid.nx,
        field.grid.ny,
        field.max_norm()
    );
    Ok(())
}

/// Like [`convolve_with_kernel`], but every component that was (near) zero in
/// the input stays zero after each pass, so smoothing does not leak gradient
/// into cells that had none.
pub fn convolve_with_kernel_preserve_zeros(
    field: &mut VectorField2D,
    kernel: &[f32],
) -> Result<()> {
    check_kernel(kernel)?;
    let zero_mask: Vec<[bool; 2]> = field
        .data
        .iter()
        .map(|c| [c[0].abs() < ZERO_EPS, c[1].abs() < ZERO_EPS])
        .collect();
    let apply_mask = |f: &mut VectorField2D| {
        for (c, m) in f.data.iter_mut().zip(&zero_mask) {
            if m[0] {
                c[0] = 0.0;
            }
            if m[1] {
                c[1] = 0.0;
            }
        }
    };

    let mut y_convolved = convolve_y(field, kernel);
    apply_mask(&mut y_convolved);
    let mut x_convolved = convolve_x(&y_convolved, kernel);
    apply_mask(&mut x_convolved);
    *field = x_convolved;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid2D;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity_kernel_leaves_field_unchanged() {
        let mut f = VectorField2D::new(Grid2D::new(4, 3));
        for (i, c) in f.data.iter_mut().enumerate() {
            *c = [i as f32, -(i as f32)];
        }
        let before = f.clone();
        convolve_with_kernel(&mut f, &[1.0]).unwrap();
        assert_eq!(f, before);
    }

    #[test]
    fn impulse_spreads_as_outer_product_of_kernel() {
        let grid = Grid2D::new(9, 9);
        let mut f = VectorField2D::new(grid);
        f.data[grid.idx(4, 4)] = [1.0, 2.0];
        convolve_with_kernel(&mut f, &SOBOLEV_KERNEL_1D).unwrap();

        for y in 1..8 {
            for x in 1..8 {
                let w = SOBOLEV_KERNEL_1D[x - 1] * SOBOLEV_KERNEL_1D[y - 1];
                let c = f.get(x, y);
                assert_abs_diff_eq!(c[0], w, epsilon = 1e-7);
                assert_abs_diff_eq!(c[1], 2.0 * w, epsilon = 1e-7);
            }
        }
        assert_eq!(f.get(0, 4), [0.0, 0.0]);
    }

    #[test]
    fn asymmetric_kernel_matches_convolution_orientation() {
        // same-mode convolution flips the kernel: out[i] = sum_k in[i + 1 - k] * w[k]
        let grid = Grid2D::new(3, 1);
        let mut f = VectorField2D::new(grid);
        f.data[1] = [1.0, 0.0];
        convolve_with_kernel(&mut f, &[1.0, 2.0, 3.0]).unwrap();
        // the y pass on a single row keeps only the centre tap (2.0)
        let u: Vec<f32> = f.data.iter().map(|c| c[0]).collect();
        assert_eq!(u, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn preserve_zeros_keeps_empty_cells_empty() {
        let grid = Grid2D::new(5, 5);
        let mut f = VectorField2D::new(grid);
        f.data[grid.idx(2, 2)] = [1.0, 0.0];
        convolve_with_kernel_preserve_zeros(&mut f, &SOBOLEV_KERNEL_1D).unwrap();
        for y in 0..5 {
            for x in 0..5 {
                let c = f.get(x, y);
                if (x, y) != (2, 2) {
                    assert_eq!(c, [0.0, 0.0]);
                }
            }
        }
        assert!(f.get(2, 2)[0] > 0.9);
        assert_eq!(f.get(2, 2)[1], 0.0);
    }

    #[test]
    fn even_kernel_is_rejected() {
        let mut f = VectorField2D::new(Grid2D::new(2, 2));
        assert!(convolve_with_kernel(&mut f, &[0.5, 0.5]).is_err());
        assert!(convolve_with_kernel_preserve_zeros(&mut f, &[]).is_err());
    }
}
