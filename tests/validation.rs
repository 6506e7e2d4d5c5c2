// tests/validation.rs
//
// Integration-style checks of the data term and the field pipeline feeding it.
// Run with: cargo test --test validation

use approx::{assert_abs_diff_eq, assert_relative_eq};
use rayon::prelude::*;

use sdf_fusion::binding::data_term_at_location_tuple;
use sdf_fusion::convolution::{convolve_with_kernel, SOBOLEV_KERNEL_1D};
use sdf_fusion::data_term::{compute_data_term, data_term_at_location, DataTermInputs};
use sdf_fusion::gradient::field_gradient;
use sdf_fusion::grid::Grid2D;
use sdf_fusion::params::{DataTermParams, OrthographicFieldOptions};
use sdf_fusion::scalar_field::ScalarField2D;
use sdf_fusion::tsdf::generate_initial_orthographic_fields;
use sdf_fusion::FusionError;

/// Four deterministic, non-trivial fields on an nx x ny grid.
fn pattern_fields(nx: usize, ny: usize) -> [ScalarField2D; 4] {
    let grid = Grid2D::new(nx, ny);
    let mut live = ScalarField2D::new(grid);
    let mut canonical = ScalarField2D::new(grid);
    for y in 0..ny {
        for x in 0..nx {
            let (fx, fy) = (x as f32, y as f32);
            live.set(x, y, (0.37 * fx).sin() * (0.21 * fy).cos());
            canonical.set(x, y, 0.5 * (0.13 * fx + 0.29 * fy).sin());
        }
    }
    let (gx, gy) = field_gradient(&live);
    [live, canonical, gx, gy]
}

fn eval(f: &[ScalarField2D; 4], x: i64, y: i64, k: f32) -> sdf_fusion::DataTermResult {
    data_term_at_location(
        &f[0],
        &f[1],
        x,
        y,
        &f[2],
        &f[3],
        &DataTermParams::with_scaling_factor(k),
    )
    .unwrap()
}

#[test]
fn worked_example_from_scalar_fields() {
    let one = |v: f32| ScalarField2D::filled(Grid2D::new(3, 2), v);
    let r = data_term_at_location(
        &one(2.0),
        &one(1.0),
        2,
        1,
        &one(0.5),
        &one(-0.25),
        &DataTermParams::default(),
    )
    .unwrap();
    assert_relative_eq!(r.gradient[0], 5.0);
    assert_relative_eq!(r.gradient[1], -2.5);
    assert_relative_eq!(r.energy, 0.5);
}

#[test]
fn identical_live_and_canonical_give_zero_everywhere() {
    let [live, _, gx, gy] = pattern_fields(12, 9);
    let params = DataTermParams::default();
    for y in 0..9 {
        for x in 0..12 {
            let r = data_term_at_location(&live, &live, x, y, &gx, &gy, &params).unwrap();
            assert_eq!(r.gradient, [0.0, 0.0]);
            assert_eq!(r.energy, 0.0);
        }
    }
}

#[test]
fn energy_is_non_negative_and_grows_with_difference() {
    let grid = Grid2D::new(1, 1);
    let g = ScalarField2D::filled(grid, 1.0);
    let canonical = ScalarField2D::filled(grid, 0.25);
    let params = DataTermParams::default();

    let mut last = -1.0_f32;
    for i in 0..20 {
        let live = ScalarField2D::filled(grid, 0.25 + 0.1 * i as f32);
        let e = data_term_at_location(&live, &canonical, 0, 0, &g, &g, &params)
            .unwrap()
            .energy;
        assert!(e >= 0.0);
        assert!(e >= last, "energy not monotonic: {} after {}", e, last);
        last = e;

        // negative differences of the same size give the same energy
        let mirrored = ScalarField2D::filled(grid, 0.25 - 0.1 * i as f32);
        let e_neg = data_term_at_location(&mirrored, &canonical, 0, 0, &g, &g, &params)
            .unwrap()
            .energy;
        assert_abs_diff_eq!(e, e_neg, epsilon = 1e-5);
    }
}

#[test]
fn gradient_is_linear_in_scaling_factor_and_local_gradient() {
    let f = pattern_fields(10, 10);
    for &(x, y) in &[(0_i64, 0_i64), (4, 7), (9, 9)] {
        let base = eval(&f, x, y, 10.0);
        let double = eval(&f, x, y, 20.0);
        assert_relative_eq!(double.gradient[0], 2.0 * base.gradient[0], max_relative = 1e-6);
        assert_relative_eq!(double.gradient[1], 2.0 * base.gradient[1], max_relative = 1e-6);
        assert_eq!(double.energy, base.energy);

        // scaling the live gradient fields scales the output
        let mut scaled = f.clone();
        scaled[2].data.iter_mut().for_each(|v| *v *= 3.0);
        scaled[3].data.iter_mut().for_each(|v| *v *= 3.0);
        let r = eval(&scaled, x, y, 10.0);
        assert_relative_eq!(r.gradient[0], 3.0 * base.gradient[0], max_relative = 1e-5, epsilon = 1e-7);
        assert_relative_eq!(r.gradient[1], 3.0 * base.gradient[1], max_relative = 1e-5, epsilon = 1e-7);
    }
}

#[test]
fn gradient_is_linear_in_difference() {
    let grid = Grid2D::new(1, 1);
    let gx = ScalarField2D::filled(grid, 0.4);
    let gy = ScalarField2D::filled(grid, -0.8);
    let canonical = ScalarField2D::filled(grid, 0.0);
    let params = DataTermParams::default();

    let at = |d: f32| {
        let live = ScalarField2D::filled(grid, d);
        data_term_at_location(&live, &canonical, 0, 0, &gx, &gy, &params).unwrap()
    };
    let r1 = at(0.25);
    let r3 = at(0.75);
    assert_relative_eq!(r3.gradient[0], 3.0 * r1.gradient[0], max_relative = 1e-6);
    assert_relative_eq!(r3.gradient[1], 3.0 * r1.gradient[1], max_relative = 1e-6);
}

#[test]
fn swapping_live_and_canonical_negates_gradient_keeps_energy() {
    let [live, canonical, gx, gy] = pattern_fields(8, 6);
    let params = DataTermParams::default();
    for y in 0..6 {
        for x in 0..8 {
            let a = data_term_at_location(&live, &canonical, x, y, &gx, &gy, &params).unwrap();
            let b = data_term_at_location(&canonical, &live, x, y, &gx, &gy, &params).unwrap();
            assert_eq!(a.gradient[0], -b.gradient[0]);
            assert_eq!(a.gradient[1], -b.gradient[1]);
            assert_eq!(a.energy, b.energy);
        }
    }
}

#[test]
fn out_of_range_locations_are_errors_not_panics() {
    let f = pattern_fields(5, 4);
    let params = DataTermParams::default();
    for &(x, y) in &[(-1_i64, 0_i64), (0, -1), (5, 0), (0, 4), (i64::MAX, 0)] {
        let r = data_term_at_location(&f[0], &f[1], x, y, &f[2], &f[3], &params);
        assert!(
            matches!(r, Err(FusionError::OutOfBounds { .. })),
            "({x}, {y}) should be out of bounds"
        );
    }
}

#[test]
fn concurrent_pointwise_calls_match_serial() {
    let f = pattern_fields(16, 16);
    let params = DataTermParams::default();
    let cells: Vec<(i64, i64)> = (0..16)
        .flat_map(|y| (0..16).map(move |x| (x, y)))
        .collect();

    let serial: Vec<_> = cells
        .iter()
        .map(|&(x, y)| data_term_at_location(&f[0], &f[1], x, y, &f[2], &f[3], &params).unwrap())
        .collect();
    let parallel: Vec<_> = cells
        .par_iter()
        .map(|&(x, y)| data_term_at_location(&f[0], &f[1], x, y, &f[2], &f[3], &params).unwrap())
        .collect();
    assert_eq!(serial, parallel);
}

#[test]
fn binding_tuple_matches_core_result() {
    let f = pattern_fields(6, 6);
    let core = eval(&f, 3, 2, 10.0);
    let t = data_term_at_location_tuple(&f[0], &f[1], 3, 2, &f[2], &f[3]).unwrap();
    assert_eq!(t.0, core.gradient);
    assert_eq!(t.1, core.energy);
}

#[test]
fn synthetic_pair_pipeline_produces_band_limited_energy() {
    let (live, canonical) =
        generate_initial_orthographic_fields(&OrthographicFieldOptions::default()).unwrap();
    let (gx, gy) = field_gradient(&live);
    let inputs = DataTermInputs::new(&live, &canonical, &gx, &gy).unwrap();
    let params = DataTermParams::default();
    let result = compute_data_term(&inputs, &params, true).unwrap();

    assert!(result.total_energy > 0.0);
    // far from both surfaces the fields agree: no energy, no gradient
    assert_eq!(result.energy.get(64, 5), 0.0);
    assert_eq!(result.gradient.get(64, 5), [0.0, 0.0]);
    assert_eq!(result.energy.get(64, 125), 0.0);
    // columns never touched by the polylines agree too
    assert_eq!(result.energy.get(2, 60), 0.0);

    // the live surface sits in front of the canonical one, so within the band
    // the live field is smaller and the data gradient opposes the live gradient
    let (x, y) = (20, 72);
    let g = result.gradient.get(x, y);
    assert!(live.get(x, y) < canonical.get(x, y));
    assert!(gy.get(x, y) < 0.0);
    assert!(g[1] > 0.0);

    // Sobolev smoothing keeps the field finite and non-trivial
    let mut smoothed = result.gradient.clone();
    convolve_with_kernel(&mut smoothed, &SOBOLEV_KERNEL_1D).unwrap();
    assert!(smoothed.data.iter().all(|c| c[0].is_finite() && c[1].is_finite()));
    assert!(smoothed.max_norm() > 0.0);
}
