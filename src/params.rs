// src/params.rs

use serde::{Deserialize, Serialize};

use crate::error::{FusionError, Result};

/// Scaling applied to the data-term gradient in the 2D fusion experiments.
pub const DEFAULT_DATA_TERM_SCALING: f32 = 10.0;

/// Parameters of the pointwise data term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTermParams {
    /// Multiplies both gradient components; energy is unaffected.
    pub scaling_factor: f32,
}

impl Default for DataTermParams {
    fn default() -> Self {
        Self {
            scaling_factor: DEFAULT_DATA_TERM_SCALING,
        }
    }
}

impl DataTermParams {
    pub fn with_scaling_factor(scaling_factor: f32) -> Self {
        Self { scaling_factor }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scaling_factor.is_finite() {
            return Err(FusionError::invalid(
                "scaling_factor",
                format!("must be finite, got {}", self.scaling_factor),
            ));
        }
        Ok(())
    }
}

/// Narrow-band parameters for TSDF generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TsdfParams {
    /// Full width of the truncation band, in voxels.
    pub narrow_band_width_voxels: usize,
    /// Rows behind the surface that still get filled; `None` = unlimited.
    pub back_cutoff_voxels: Option<usize>,
    /// Value of cells never touched by a surface.
    pub default_value: f32,
}

impl Default for TsdfParams {
    fn default() -> Self {
        Self {
            narrow_band_width_voxels: 20,
            back_cutoff_voxels: None,
            default_value: 1.0,
        }
    }
}

impl TsdfParams {
    pub fn validate(&self) -> Result<()> {
        if self.narrow_band_width_voxels < 2 {
            return Err(FusionError::invalid(
                "narrow_band_width_voxels",
                format!("must be at least 2, got {}", self.narrow_band_width_voxels),
            ));
        }
        Ok(())
    }
}

/// Options for the synthetic live/canonical pair used by the 2D experiments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrthographicFieldOptions {
    pub field_size: usize,
    pub narrow_band_width_voxels: usize,
    /// Limit the canonical field to 3 voxels behind the surface (SobolevFusion's eta).
    pub mimic_eta: bool,
    /// Gaussian kernel size for the live field, 0 = no smoothing.
    pub live_smoothing_kernel_size: usize,
    /// Gaussian kernel size for the canonical field, 0 = no smoothing.
    pub canonical_smoothing_kernel_size: usize,
    pub default_value: f32,
}

impl Default for OrthographicFieldOptions {
    fn default() -> Self {
        Self {
            field_size: 128,
            narrow_band_width_voxels: 20,
            mimic_eta: false,
            live_smoothing_kernel_size: 0,
            canonical_smoothing_kernel_size: 0,
            default_value: 1.0,
        }
    }
}
