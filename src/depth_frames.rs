// src/depth_frames.rs
//
// Recorded depth sequences: 16-bit PNGs named `depth_<n>.png`, optionally
// with `mask_<n>.png` next to them, where <n> is a zero-padded frame number
// of five or six digits. Two consecutive frames give a canonical (frame i)
// and live (frame i + 1) TSDF, each built from the same image row.

use log::{debug, info, warn};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::{FusionError, Result};
use crate::scalar_field::ScalarField2D;
use crate::tsdf::{generate_tsdf_field_from_depth_row, DepthCamera, DepthImage, DepthRowParams};

/// Zero-padding of the frame numbers in a sequence directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFilenameFormat {
    FiveDigit,
    SixDigit,
}

impl FrameFilenameFormat {
    pub fn digits(self) -> usize {
        match self {
            FrameFilenameFormat::FiveDigit => 5,
            FrameFilenameFormat::SixDigit => 6,
        }
    }

    fn from_digits(n: usize) -> Option<Self> {
        match n {
            5 => Some(FrameFilenameFormat::FiveDigit),
            6 => Some(FrameFilenameFormat::SixDigit),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        match self {
            FrameFilenameFormat::FiveDigit => 0,
            FrameFilenameFormat::SixDigit => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameFileKind {
    Depth,
    Mask,
}

fn classify_frame_filename(name: &str) -> Option<(FrameFileKind, FrameFilenameFormat)> {
    let (kind, rest) = if let Some(rest) = name.strip_prefix("depth_") {
        (FrameFileKind::Depth, rest)
    } else if let Some(rest) = name.strip_prefix("mask_") {
        (FrameFileKind::Mask, rest)
    } else {
        return None;
    };
    let number = rest.strip_suffix(".png")?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((kind, FrameFilenameFormat::from_digits(number.len())?))
}

/// Decode a PNG as a 16-bit single-channel image.
///
/// 16-bit grayscale files come through unchanged; 8-bit files (masks) are
/// widened, which keeps zero at zero.
pub fn load_depth_png(path: &Path) -> Result<DepthImage> {
    let gray = image::open(path)?.into_luma16();
    let (width, height) = gray.dimensions();
    DepthImage::new(width as usize, height as usize, gray.into_raw())
}

/// A directory holding one depth sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDirectory {
    pub path: PathBuf,
    pub frame_count: usize,
    pub format: FrameFilenameFormat,
    pub use_masks: bool,
}

impl FrameDirectory {
    /// Count the depth and mask files in `path` and settle on a naming format.
    ///
    /// The format with more depth files wins (ties go to six digits). Masks
    /// are used only when `check_masks` is set and there is exactly one mask
    /// per depth frame in the chosen format.
    pub fn scan(path: &Path, check_masks: bool) -> Result<Self> {
        let mut depth_counts = [0usize; 2];
        let mut mask_counts = [0usize; 2];
        for entry in fs::read_dir(path)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match classify_frame_filename(name) {
                Some((FrameFileKind::Depth, format)) => depth_counts[format.slot()] += 1,
                Some((FrameFileKind::Mask, format)) => mask_counts[format.slot()] += 1,
                None => {}
            }
        }

        let format = if depth_counts[0] > depth_counts[1] {
            FrameFilenameFormat::FiveDigit
        } else {
            FrameFilenameFormat::SixDigit
        };
        let frame_count = depth_counts[format.slot()];
        if frame_count == 0 {
            return Err(FusionError::invalid(
                "frame directory",
                format!("no depth_*.png frames in {:?}", path),
            ));
        }

        let has_masks = mask_counts.iter().any(|&c| c > 0);
        let mut use_masks = check_masks && has_masks;
        if use_masks && mask_counts[format.slot()] != frame_count {
            warn!(
                "[frames] found {} mask files for {} depth frames ({}-digit names); ignoring masks",
                mask_counts[format.slot()],
                frame_count,
                format.digits()
            );
            use_masks = false;
        }

        info!(
            "[frames] {:?}: {} frames, {}-digit names, masks {}",
            path,
            frame_count,
            format.digits(),
            if use_masks { "on" } else { "off" }
        );
        Ok(Self {
            path: path.to_path_buf(),
            frame_count,
            format,
            use_masks,
        })
    }

    pub fn depth_path(&self, index: usize) -> PathBuf {
        self.path
            .join(format!("depth_{:0w$}.png", index, w = self.format.digits()))
    }

    pub fn mask_path(&self, index: usize) -> PathBuf {
        self.path
            .join(format!("mask_{:0w$}.png", index, w = self.format.digits()))
    }

    /// Depth image of frame `index`, masked when masks are in use.
    pub fn load_frame(&self, index: usize) -> Result<DepthImage> {
        let mut depth = load_depth_png(&self.depth_path(index))?;
        if self.use_masks {
            let mask = load_depth_png(&self.mask_path(index))?;
            depth.apply_mask(&mask)?;
        }
        debug!(
            "[frames] loaded frame {} ({} x {})",
            index, depth.width, depth.height
        );
        Ok(depth)
    }

    /// Frames `canonical_index` and `canonical_index + 1`.
    pub fn load_pair(&self, canonical_index: usize) -> Result<FramePair> {
        let live_index = canonical_index + 1;
        if live_index >= self.frame_count {
            return Err(FusionError::invalid(
                "canonical_frame_index",
                format!(
                    "{} has no following frame ({} frames)",
                    canonical_index, self.frame_count
                ),
            ));
        }
        Ok(FramePair {
            canonical_index,
            canonical: self.load_frame(canonical_index)?,
            live: self.load_frame(live_index)?,
        })
    }
}

/// Two consecutive depth frames.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePair {
    pub canonical_index: usize,
    pub canonical: DepthImage,
    pub live: DepthImage,
}

impl FramePair {
    pub fn live_index(&self) -> usize {
        self.canonical_index + 1
    }

    /// First row in `rows` with depth in both frames, searching from
    /// `preferred` to the end of the range and then from its start.
    pub fn first_usable_row(&self, rows: Range<usize>, preferred: usize) -> Option<usize> {
        let end = rows
            .end
            .min(self.canonical.height)
            .min(self.live.height);
        let start = rows.start;
        if start >= end {
            return None;
        }
        let n = end - start;
        let first = preferred.clamp(start, end - 1) - start;
        (0..n)
            .map(|i| start + (first + i) % n)
            .find(|&y| !self.canonical.is_row_empty(y) && !self.live.is_row_empty(y))
    }

    /// (live, canonical) TSDFs of image row `pixel_row`.
    pub fn generate_fields(
        &self,
        pixel_row: usize,
        camera: &DepthCamera,
        camera_extrinsic_matrix: &Matrix4<f32>,
        params: &DepthRowParams,
    ) -> Result<(ScalarField2D, ScalarField2D)> {
        for (frame, image) in [
            (self.canonical_index, &self.canonical),
            (self.live_index(), &self.live),
        ] {
            if pixel_row < image.height && image.is_row_empty(pixel_row) {
                return Err(FusionError::EmptyDepthRow {
                    frame,
                    row: pixel_row,
                });
            }
        }
        let canonical = generate_tsdf_field_from_depth_row(
            &self.canonical,
            camera,
            pixel_row,
            camera_extrinsic_matrix,
            params,
        )?;
        let live = generate_tsdf_field_from_depth_row(
            &self.live,
            camera,
            pixel_row,
            camera_extrinsic_matrix,
            params,
        )?;
        Ok((live, canonical))
    }
}

/// Pinhole intrinsics in a serialisable form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// Metres per raw depth unit.
    pub depth_unit_ratio: f32,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            fx: 525.0,
            fy: 525.0,
            cx: 319.5,
            cy: 239.5,
            depth_unit_ratio: 0.001,
        }
    }
}

impl CameraIntrinsics {
    pub fn to_camera(&self) -> DepthCamera {
        DepthCamera::new(self.fx, self.fy, self.cx, self.cy, self.depth_unit_ratio)
    }
}

/// Field origin used for recorded frame pairs, in voxels from the camera.
pub const FRAME_PAIR_ARRAY_OFFSET: [i32; 3] = [-64, -64, 128];

/// Where to take a live/canonical pair from in a recorded sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramePairOptions {
    pub directory: PathBuf,
    pub canonical_frame_index: usize,
    pub pixel_row: usize,
    /// Rows considered when `pixel_row` is empty in either frame.
    pub row_range: [usize; 2],
    pub replace_empty_rows: bool,
    pub use_masks: bool,
    pub camera: CameraIntrinsics,
    pub depth: DepthRowParams,
}

impl Default for FramePairOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            canonical_frame_index: 0,
            pixel_row: 214,
            row_range: [214, 400],
            replace_empty_rows: true,
            use_masks: true,
            camera: CameraIntrinsics::default(),
            depth: DepthRowParams {
                array_offset: FRAME_PAIR_ARRAY_OFFSET,
                ..DepthRowParams::default()
            },
        }
    }
}

/// TSDF pair built from a recorded sequence.
#[derive(Debug, Clone)]
pub struct FramePairFields {
    pub live: ScalarField2D,
    pub canonical: ScalarField2D,
    pub canonical_index: usize,
    /// Image row actually used.
    pub pixel_row: usize,
}

impl FramePairOptions {
    /// Scan the directory, load both frames and build the pair with the
    /// camera at the world origin.
    pub fn generate(&self) -> Result<FramePairFields> {
        let frames = FrameDirectory::scan(&self.directory, self.use_masks)?;
        let pair = frames.load_pair(self.canonical_frame_index)?;

        let mut pixel_row = self.pixel_row;
        if self.replace_empty_rows {
            let rows = self.row_range[0]..self.row_range[1];
            pixel_row = pair.first_usable_row(rows, self.pixel_row).ok_or(
                FusionError::EmptyDepthRow {
                    frame: self.canonical_frame_index,
                    row: self.pixel_row,
                },
            )?;
            if pixel_row != self.pixel_row {
                info!(
                    "[frames] row {} is empty, using row {}",
                    self.pixel_row, pixel_row
                );
            }
        }

        let (live, canonical) = pair.generate_fields(
            pixel_row,
            &self.camera.to_camera(),
            &Matrix4::identity(),
            &self.depth,
        )?;
        Ok(FramePairFields {
            live,
            canonical,
            canonical_index: self.canonical_frame_index,
            pixel_row,
        })
    }
}
