// src/error.rs

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, FusionError>;

#[derive(Debug, Error)]
pub enum FusionError {
    /// A cell coordinate outside one of the supplied fields.
    #[error("location ({x}, {y}) is outside the {field} field ({nx} x {ny})")]
    OutOfBounds {
        field: &'static str,
        x: i64,
        y: i64,
        nx: usize,
        ny: usize,
    },

    #[error("{field} field is {got_nx} x {got_ny}, expected {nx} x {ny}")]
    ShapeMismatch {
        field: &'static str,
        got_nx: usize,
        got_ny: usize,
        nx: usize,
        ny: usize,
    },

    #[error("field has no cells")]
    EmptyField,

    #[error("invalid {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("surface at column {x} (row {row:.3}) is too close to row 0 for a {band}-voxel narrow band")]
    SurfaceTooClose { x: usize, row: f32, band: usize },

    #[error("row {row} of depth frame {frame} has no depth")]
    EmptyDepthRow { frame: usize, row: usize },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plot error: {0}")]
    Plot(String),
}

impl FusionError {
    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}
