// src/lib.rs

pub mod binding;
pub mod config;
pub mod convolution;
pub mod data_term;
pub mod depth_frames;
pub mod error;
pub mod gradient;
pub mod grid;
pub mod logging;
pub mod params;
pub mod scalar_field;
pub mod smoothing;
pub mod tsdf;
pub mod vector_field;
pub mod visualisation;

pub use data_term::{data_term_at_location, DataTermResult};
pub use error::{FusionError, Result};
