// src/tsdf.rs
//
// 2D truncated signed distance fields for the fusion experiments.
//
// Two sources:
//  - orthographic "surfaces" given as piecewise-linear polylines, one surface
//    row per field column (synthetic live / canonical pairs);
//  - a single row of a depth image seen through a pinhole camera.
//
// Field layout: x = column, y = row = distance from the camera plane.
// Values are +1 in front of the surface, -1 behind it, and a linear ramp
// inside the narrow band.

use log::{debug, info};
use nalgebra::{Matrix3, Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};
use crate::grid::Grid2D;
use crate::params::{OrthographicFieldOptions, TsdfParams};
use crate::scalar_field::ScalarField2D;
use crate::smoothing::gaussian_blur;

/// A polyline vertex in voxel coordinates (x = column, y = row).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Write the narrow-band representation of a polyline surface into `field`.
///
/// For every integer column between consecutive vertices the surface row `s`
/// is interpolated linearly. Rows before the band become +1, rows in
/// `[s - hw, s + min(hw, cutoff) + 1)` get `clamp((s - y) / hw, -1, 1)` with
/// `hw = narrow_band_width_voxels / 2`, and the remaining rows become -1
/// unless a back cutoff holds them back. The band is clipped at the last row.
pub fn add_surface_to_field(
    field: &mut ScalarField2D,
    consecutive_surface_points: &[Point2],
    params: &TsdfParams,
) -> Result<()> {
    params.validate()?;
    let band = params.narrow_band_width_voxels;
    let half_width = band / 2;
    let hw = half_width as f32;
    let back_extent = params
        .back_cutoff_voxels
        .map_or(half_width, |c| half_width.min(c));
    let ny = field.grid.ny;

    for pair in consecutive_surface_points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let x_dist = b.x - a.x;
        let x_start = a.x as i64;
        let x_end = b.x as i64;

        for x in x_start..x_end {
            if !field.grid.contains(x, 0) {
                return Err(FusionError::OutOfBounds {
                    field: "tsdf",
                    x,
                    y: 0,
                    nx: field.grid.nx,
                    ny,
                });
            }
            let xu = x as usize;
            let ratio = (x as f32 - a.x) / x_dist;
            let surface_row = a.y * (1.0 - ratio) + b.y * ratio;
            if surface_row - (band as f32) < 0.0 {
                return Err(FusionError::SurfaceTooClose {
                    x: xu,
                    row: surface_row,
                    band,
                });
            }

            let start = ((surface_row - hw) as usize).min(ny);
            let end = ((surface_row + back_extent as f32 + 1.0) as usize).min(ny);

            for y in 0..start {
                field.set(xu, y, 1.0);
            }
            for y in start..end {
                let distance = ((surface_row - y as f32) / hw).clamp(-1.0, 1.0);
                field.set(xu, y, distance);
            }

            let fill_behind = params.back_cutoff_voxels.map_or(true, |c| end < c);
            if end < ny && fill_behind {
                for y in end..ny {
                    field.set(xu, y, -1.0);
                }
            }
        }
    }
    Ok(())
}

/// Square `size` x `size` field holding one polyline surface.
pub fn generate_sample_orthographic_field(
    consecutive_surface_points: &[Point2],
    size: usize,
    params: &TsdfParams,
) -> Result<ScalarField2D> {
    let mut field = ScalarField2D::filled(Grid2D::square(size), params.default_value);
    add_surface_to_field(&mut field, consecutive_surface_points, params)?;
    Ok(field)
}

/// Main wavy surface of the synthetic 2D scene.
const SURFACE_POINTS: [[f32; 2]; 13] = [
    [9.0, 56.0],
    [14.0, 66.0],
    [23.0, 72.0],
    [35.0, 72.0],
    [44.0, 65.0],
    [54.0, 60.0],
    [63.0, 60.0],
    [69.0, 64.0],
    [76.0, 71.0],
    [84.0, 73.0],
    [91.0, 72.0],
    [106.0, 63.0],
    [109.0, 57.0],
];

/// Small ledge drawn over the main surface.
const SURFACE_POINTS_EXTRA: [[f32; 2]; 3] = [[32.0, 65.0], [36.0, 65.0], [41.0, 61.0]];

/// Vertices sit on integer rows; a surface never lands exactly on voxels.
const SURFACE_ROW_OFFSET: f32 = -0.23;

/// Canonical surface = live surface moved this many rows away from the camera.
const CANONICAL_SHIFT_ROWS: f32 = 5.0;

/// Back cutoff that imitates SobolevFusion's eta on the canonical field.
const ETA_BACK_CUTOFF_VOXELS: usize = 3;

/// Polyline vertices offset off the voxel rows, then moved `shift_rows` away.
fn to_points(coords: &[[f32; 2]], shift_rows: f32) -> Vec<Point2> {
    coords
        .iter()
        .map(|c| Point2::new(c[0], (c[1] + SURFACE_ROW_OFFSET) + shift_rows))
        .collect()
}

/// Synthetic (live, canonical) TSDF pair: the same surface, with canonical
/// shifted 5 rows further from the camera. Needs `field_size >= 110`.
pub fn generate_initial_orthographic_fields(
    opts: &OrthographicFieldOptions,
) -> Result<(ScalarField2D, ScalarField2D)> {
    let live_params = TsdfParams {
        narrow_band_width_voxels: opts.narrow_band_width_voxels,
        back_cutoff_voxels: None,
        default_value: opts.default_value,
    };
    let live_points = to_points(&SURFACE_POINTS, 0.0);
    let live_extra = to_points(&SURFACE_POINTS_EXTRA, 0.0);

    let mut live = generate_sample_orthographic_field(&live_points, opts.field_size, &live_params)?;
    add_surface_to_field(&mut live, &live_extra, &live_params)?;

    let canonical_params = TsdfParams {
        back_cutoff_voxels: opts.mimic_eta.then_some(ETA_BACK_CUTOFF_VOXELS),
        ..live_params
    };
    let canonical_points = to_points(&SURFACE_POINTS, CANONICAL_SHIFT_ROWS);
    let canonical_extra = to_points(&SURFACE_POINTS_EXTRA, CANONICAL_SHIFT_ROWS);

    let mut canonical =
        generate_sample_orthographic_field(&canonical_points, opts.field_size, &canonical_params)?;
    add_surface_to_field(&mut canonical, &canonical_extra, &canonical_params)?;

    if opts.live_smoothing_kernel_size > 0 {
        live = gaussian_blur(&live, opts.live_smoothing_kernel_size)?;
    }
    if opts.canonical_smoothing_kernel_size > 0 {
        canonical = gaussian_blur(&canonical, opts.canonical_smoothing_kernel_size)?;
    }

    info!(
        "[tsdf] generated {0}x{0} orthographic live/canonical pair (band={1}, eta={2})",
        opts.field_size, opts.narrow_band_width_voxels, opts.mimic_eta
    );
    Ok((live, canonical))
}

// ---------------------------------------------------------------------------
// Depth-image source
// ---------------------------------------------------------------------------

/// Raw 16-bit depth image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
}

impl DepthImage {
    pub fn new(width: usize, height: usize, data: Vec<u16>) -> Result<Self> {
        if data.len() != width * height {
            return Err(FusionError::invalid(
                "depth image",
                format!(
                    "got {} pixels, expected {} ({} x {})",
                    data.len(),
                    width * height,
                    width,
                    height
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, value: u16) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.data[y * self.width + x]
    }

    /// True if row `y` holds no depth at all (or does not exist).
    pub fn is_row_empty(&self, y: usize) -> bool {
        if y >= self.height {
            return true;
        }
        let start = y * self.width;
        self.data[start..start + self.width].iter().all(|&d| d == 0)
    }

    /// Zero every pixel whose mask value is 0.
    pub fn apply_mask(&mut self, mask: &DepthImage) -> Result<()> {
        if mask.width != self.width || mask.height != self.height {
            return Err(FusionError::invalid(
                "mask",
                format!(
                    "is {} x {}, depth image is {} x {}",
                    mask.width, mask.height, self.width, self.height
                ),
            ));
        }
        for (d, &m) in self.data.iter_mut().zip(&mask.data) {
            if m == 0 {
                *d = 0;
            }
        }
        Ok(())
    }
}

/// Bilinear sample of `image` at continuous pixel coordinates, clamped to the image.
pub fn bilinear_sample_at(image: &DepthImage, x: f32, y: f32) -> f32 {
    if image.width == 0 || image.height == 0 {
        return 0.0;
    }
    let max_x = (image.width - 1) as f32;
    let max_y = (image.height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(image.width - 1);
    let y1 = (y0 + 1).min(image.height - 1);
    let tx = x - x0 as f32;
    let ty = y - y0 as f32;

    let p00 = image.get(x0, y0) as f32;
    let p10 = image.get(x1, y0) as f32;
    let p01 = image.get(x0, y1) as f32;
    let p11 = image.get(x1, y1) as f32;

    let top = p00 * (1.0 - tx) + p10 * tx;
    let bottom = p01 * (1.0 - tx) + p11 * tx;
    top * (1.0 - ty) + bottom * ty
}

/// Pinhole depth camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthCamera {
    /// [fx 0 cx; 0 fy cy; 0 0 1]
    pub intrinsic_matrix: Matrix3<f32>,
    /// Metres per raw depth unit (0.001 for millimetre images).
    pub depth_unit_ratio: f32,
}

impl DepthCamera {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32, depth_unit_ratio: f32) -> Self {
        Self {
            intrinsic_matrix: Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            depth_unit_ratio,
        }
    }

    pub fn fx(&self) -> f32 {
        self.intrinsic_matrix[(0, 0)]
    }

    pub fn cx(&self) -> f32 {
        self.intrinsic_matrix[(0, 2)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthInterpolation {
    /// Nearest image column.
    #[default]
    None,
    Bilinear,
}

/// Placement and truncation of a TSDF generated from a depth row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthRowParams {
    pub field_size: usize,
    /// Voxel edge length in metres.
    pub voxel_size: f32,
    /// Field origin relative to the camera, in voxels (x, y, z).
    pub array_offset: [i32; 3],
    pub narrow_band_width_voxels: usize,
    pub default_value: f32,
    pub interpolation: DepthInterpolation,
}

impl Default for DepthRowParams {
    fn default() -> Self {
        Self {
            field_size: 128,
            voxel_size: 0.004,
            array_offset: [-64, -64, 64],
            narrow_band_width_voxels: 20,
            default_value: 1.0,
            interpolation: DepthInterpolation::None,
        }
    }
}

/// TSDF of one depth-image row.
///
/// Field column x maps to camera-space X, field row y to camera-space Z (the
/// slice lies in the Y = 0 plane). `camera_extrinsic_matrix` is `[R | T; 0 | 1]`.
/// Voxels behind the camera, projecting outside the image, or hitting
/// missing depth keep `default_value`.
pub fn generate_tsdf_field_from_depth_row(
    depth_image: &DepthImage,
    camera: &DepthCamera,
    image_y_coordinate: usize,
    camera_extrinsic_matrix: &Matrix4<f32>,
    params: &DepthRowParams,
) -> Result<ScalarField2D> {
    if image_y_coordinate >= depth_image.height {
        return Err(FusionError::OutOfBounds {
            field: "depth image",
            x: 0,
            y: image_y_coordinate as i64,
            nx: depth_image.width,
            ny: depth_image.height,
        });
    }
    if !(params.voxel_size > 0.0) {
        return Err(FusionError::invalid(
            "voxel_size",
            format!("must be positive, got {}", params.voxel_size),
        ));
    }

    let size = params.field_size;
    let mut field = ScalarField2D::filled(Grid2D::square(size), params.default_value);
    let fx = camera.fx();
    let cx = camera.cx();
    let narrow_band_half_width = params.narrow_band_width_voxels as f32 / 2.0 * params.voxel_size;
    let [off_x, _, off_z] = params.array_offset;
    let mut written = 0usize;

    for y_field in 0..size {
        for x_field in 0..size {
            let x_voxel = (x_field as i64 + off_x as i64) as f32 * params.voxel_size;
            let z_voxel = (y_field as i64 + off_z as i64) as f32 * params.voxel_size;
            let point = Vector4::new(x_voxel, 0.0, z_voxel, 1.0);
            let p = camera_extrinsic_matrix * point;

            if p.z <= 0.0 {
                continue;
            }

            let image_x = fx * p.x / p.z + cx;
            let raw_depth = match params.interpolation {
                DepthInterpolation::None => {
                    let col = (image_x + 0.5).floor();
                    if col < 0.0 || col >= depth_image.width as f32 {
                        continue;
                    }
                    depth_image.get(col as usize, image_y_coordinate) as f32
                }
                DepthInterpolation::Bilinear => {
                    if image_x < 0.0 || image_x >= depth_image.width as f32 {
                        continue;
                    }
                    bilinear_sample_at(depth_image, image_x, image_y_coordinate as f32)
                }
            };

            let depth = raw_depth * camera.depth_unit_ratio;
            if depth <= 0.0 {
                continue;
            }

            let signed_distance = depth - p.z;
            let value = (signed_distance / narrow_band_half_width).clamp(-1.0, 1.0);
            field.set(x_field, y_field, value);
            written += 1;
        }
    }

    debug!(
        "[tsdf] depth row {} -> {} of {} voxels written",
        image_y_coordinate,
        written,
        size * size
    );
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn flat_surface_produces_band_ramp() {
        let params = TsdfParams {
            narrow_band_width_voxels: 4,
            ..TsdfParams::default()
        };
        let points = [Point2::new(0.0, 5.0), Point2::new(3.0, 5.0)];
        let f = generate_sample_orthographic_field(&points, 10, &params).unwrap();

        // hw = 2: band rows [3, 8)
        let col: Vec<f32> = (0..10).map(|y| f.get(0, y)).collect();
        assert_eq!(col, vec![1.0, 1.0, 1.0, 1.0, 0.5, 0.0, -0.5, -1.0, -1.0, -1.0]);

        // columns outside the polyline keep the default value
        assert!((0..10).all(|y| f.get(5, y) == 1.0));
    }

    #[test]
    fn back_cutoff_leaves_far_rows_untouched() {
        let params = TsdfParams {
            narrow_band_width_voxels: 4,
            back_cutoff_voxels: Some(1),
            default_value: 1.0,
        };
        let points = [Point2::new(0.0, 5.0), Point2::new(2.0, 5.0)];
        let f = generate_sample_orthographic_field(&points, 10, &params).unwrap();
        // band rows [3, 7): 3,4,5,6 then untouched default
        let col: Vec<f32> = (0..10).map(|y| f.get(0, y)).collect();
        assert_eq!(col, vec![1.0, 1.0, 1.0, 1.0, 0.5, 0.0, -0.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn surface_near_top_is_rejected() {
        let points = [Point2::new(0.0, 5.0), Point2::new(2.0, 5.0)];
        let r = generate_sample_orthographic_field(&points, 32, &TsdfParams::default());
        assert!(matches!(r, Err(FusionError::SurfaceTooClose { band: 20, .. })));
    }

    #[test]
    fn polyline_past_right_edge_is_rejected() {
        let params = TsdfParams {
            narrow_band_width_voxels: 4,
            ..TsdfParams::default()
        };
        let points = [Point2::new(0.0, 5.0), Point2::new(12.0, 5.0)];
        let r = generate_sample_orthographic_field(&points, 10, &params);
        assert!(matches!(r, Err(FusionError::OutOfBounds { x: 10, .. })));
    }

    #[test]
    fn initial_pair_is_shifted_copy() {
        let (live, canonical) =
            generate_initial_orthographic_fields(&OrthographicFieldOptions::default()).unwrap();
        assert_eq!(live.grid, Grid2D::square(128));
        assert_eq!(canonical.grid, live.grid);

        // column 20 lies on the main surface only (between (14,66) and (23,72))
        let ratio = (20.0 - 14.0) / 9.0;
        let s = 66.0 * (1.0 - ratio) + 72.0 * ratio - 0.23;
        let y = 60usize;
        assert_abs_diff_eq!(live.get(20, y), (s - y as f32) / 10.0, epsilon = 1e-5);
        assert_abs_diff_eq!(canonical.get(20, y + 5), live.get(20, y), epsilon = 1e-5);

        // far behind the surface both are -1, ahead both are +1
        assert_eq!(live.get(20, 120), -1.0);
        assert_eq!(canonical.get(20, 120), -1.0);
        assert_eq!(live.get(20, 10), 1.0);
    }

    #[test]
    fn canonical_vertices_are_offset_then_shifted() {
        let live = to_points(&SURFACE_POINTS, 0.0);
        let canonical = to_points(&SURFACE_POINTS, CANONICAL_SHIFT_ROWS);
        for ((c, l), k) in SURFACE_POINTS.iter().zip(&live).zip(&canonical) {
            let offset = c[1] - 0.23_f32;
            assert_eq!(l.y, offset);
            assert_eq!(k.y, offset + 5.0);
            assert_eq!(k.x, c[0]);
        }
    }

    #[test]
    fn mimic_eta_stops_canonical_fill_behind_band() {
        let opts = OrthographicFieldOptions {
            mimic_eta: true,
            ..OrthographicFieldOptions::default()
        };
        let (live, canonical) = generate_initial_orthographic_fields(&opts).unwrap();
        assert_eq!(live.get(20, 120), -1.0);
        assert_eq!(canonical.get(20, 120), 1.0);
    }

    fn flat_wall_setup() -> (DepthImage, DepthCamera, DepthRowParams) {
        // wall at 1.0 m, 3-row image
        let image = DepthImage::filled(640, 3, 1000);
        let camera = DepthCamera::new(700.0, 700.0, 320.0, 1.0, 0.001);
        let params = DepthRowParams {
            field_size: 16,
            array_offset: [-8, -8, 242],
            ..DepthRowParams::default()
        };
        (image, camera, params)
    }

    #[test]
    fn depth_row_of_flat_wall_ramps_with_row() {
        let (image, camera, params) = flat_wall_setup();
        let f = generate_tsdf_field_from_depth_row(&image, &camera, 1, &Matrix4::identity(), &params)
            .unwrap();
        // z = (y + 242) * 0.004, sd = 1.0 - z, half band = 0.04
        for y in 0..16 {
            let expected = (0.8 - 0.1 * y as f32).clamp(-1.0, 1.0);
            for x in [0usize, 7, 15] {
                assert_abs_diff_eq!(f.get(x, y), expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn bilinear_matches_nearest_on_constant_image() {
        let (image, camera, params) = flat_wall_setup();
        let nearest =
            generate_tsdf_field_from_depth_row(&image, &camera, 1, &Matrix4::identity(), &params)
                .unwrap();
        let bilinear_params = DepthRowParams {
            interpolation: DepthInterpolation::Bilinear,
            ..params
        };
        let bilinear = generate_tsdf_field_from_depth_row(
            &image,
            &camera,
            1,
            &Matrix4::identity(),
            &bilinear_params,
        )
        .unwrap();
        for (a, b) in nearest.data.iter().zip(&bilinear.data) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn missing_depth_keeps_default_value() {
        let (_, camera, params) = flat_wall_setup();
        let image = DepthImage::filled(640, 3, 0);
        let f = generate_tsdf_field_from_depth_row(&image, &camera, 1, &Matrix4::identity(), &params)
            .unwrap();
        assert!(f.data.iter().all(|&v| v == params.default_value));
    }

    #[test]
    fn depth_row_outside_image_is_an_error() {
        let (image, camera, params) = flat_wall_setup();
        let r = generate_tsdf_field_from_depth_row(&image, &camera, 3, &Matrix4::identity(), &params);
        assert!(matches!(r, Err(FusionError::OutOfBounds { field: "depth image", .. })));
    }

    #[test]
    fn mask_clears_depth_and_empties_rows() {
        let mut image = DepthImage::new(3, 2, vec![5, 6, 7, 8, 9, 10]).unwrap();
        let mask = DepthImage::new(3, 2, vec![0, 0, 0, 1, 0, 255]).unwrap();
        assert!(!image.is_row_empty(0));
        image.apply_mask(&mask).unwrap();
        assert_eq!(image.data, vec![0, 0, 0, 8, 0, 10]);
        assert!(image.is_row_empty(0));
        assert!(!image.is_row_empty(1));
        assert!(image.is_row_empty(2));

        let wrong = DepthImage::filled(2, 2, 1);
        assert!(image.apply_mask(&wrong).is_err());
    }

    #[test]
    fn bilinear_sample_interpolates_between_pixels() {
        let image = DepthImage::new(2, 2, vec![0, 100, 200, 300]).unwrap();
        assert_abs_diff_eq!(bilinear_sample_at(&image, 0.5, 0.0), 50.0);
        assert_abs_diff_eq!(bilinear_sample_at(&image, 0.5, 0.5), 150.0);
        assert_abs_diff_eq!(bilinear_sample_at(&image, 5.0, 5.0), 300.0);
    }
}
