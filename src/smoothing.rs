// src/smoothing.rs
//
// Separable Gaussian blur with replicated borders, used to soften the
// synthetic live / canonical TSDFs before optimisation. Kernel taps follow
// OpenCV's `getGaussianKernel` for a zero sigma.

use crate::error::{FusionError, Result};
use crate::scalar_field::ScalarField2D;

/// Fixed taps OpenCV uses for kernel sizes up to 7 when no sigma is given.
const SMALL_GAUSSIAN_TAPS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// Sigma that OpenCV derives from a kernel size when none is given.
pub fn auto_sigma(kernel_size: usize) -> f64 {
    0.3 * ((kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalised 1D Gaussian taps of odd length `kernel_size`.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f64) -> Result<Vec<f32>> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(FusionError::invalid(
            "kernel_size",
            format!("must be odd and positive, got {}", kernel_size),
        ));
    }
    if !(sigma > 0.0) {
        return Err(FusionError::invalid(
            "sigma",
            format!("must be positive, got {}", sigma),
        ));
    }
    let half = (kernel_size / 2) as f64;
    let taps: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    Ok(taps.into_iter().map(|t| (t / sum) as f32).collect())
}

/// Taps of a Gaussian of size `kernel_size` with sigma derived from the size.
///
/// Sizes 1, 3, 5 and 7 use the fixed binomial-like tables; larger sizes
/// sample a Gaussian with [`auto_sigma`].
pub fn auto_gaussian_kernel(kernel_size: usize) -> Result<Vec<f32>> {
    if kernel_size % 2 == 1 && kernel_size <= 7 {
        return Ok(SMALL_GAUSSIAN_TAPS[kernel_size / 2].to_vec());
    }
    gaussian_kernel_1d(kernel_size, auto_sigma(kernel_size))
}

#[inline]
fn clamp_index(i: isize, n: usize) -> usize {
    i.clamp(0, n as isize - 1) as usize
}

/// Gaussian blur of `field` with a `kernel_size` x `kernel_size` kernel.
pub fn gaussian_blur(field: &ScalarField2D, kernel_size: usize) -> Result<ScalarField2D> {
    let kernel = auto_gaussian_kernel(kernel_size)?;
    let grid = field.grid;
    if grid.is_empty() {
        return Ok(field.clone());
    }
    let (nx, ny) = (grid.nx, grid.ny);
    let half = (kernel.len() / 2) as isize;

    // horizontal pass
    let mut tmp = ScalarField2D::new(grid);
    for y in 0..ny {
        for x in 0..nx {
            let mut acc = 0.0_f32;
            for (k, &w) in kernel.iter().enumerate() {
                let xs = clamp_index(x as isize + k as isize - half, nx);
                acc += w * field.get(xs, y);
            }
            tmp.set(x, y, acc);
        }
    }

    // vertical pass
    let mut out = ScalarField2D::new(grid);
    for y in 0..ny {
        for x in 0..nx {
            let mut acc = 0.0_f32;
            for (k, &w) in kernel.iter().enumerate() {
                let ys = clamp_index(y as isize + k as isize - half, ny);
                acc += w * tmp.get(x, ys);
            }
            out.set(x, y, acc);
        }
    }

    Ok(out)
}
